//! In-memory inverted keyword index.
//!
//! Maps case-folded tokens to the set of record ids whose subject or body
//! contained that token when the record was last indexed. The index is
//! additive: rebuilding over a batch accumulates new tokens and ids but
//! never removes stale associations — staleness is resolved only by
//! constructing a fresh index and rebuilding over the full corpus.

use std::collections::{HashMap, HashSet};

use crate::models::EmailRecord;

/// Inverted index from normalized tokens to record ids.
///
/// Not internally synchronized; callers serialize writes against reads.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    index: HashMap<String, HashSet<i64>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct tokens currently indexed.
    pub fn term_count(&self) -> usize {
        self.index.len()
    }

    /// Index a batch of records: every token of each record's subject+body
    /// gains that record's id. Additive across calls.
    pub fn build<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'a EmailRecord>,
    {
        let mut count = 0usize;
        for record in records {
            for token in tokenize(&record.indexable_text()) {
                self.index.entry(token).or_default().insert(record.id);
            }
            count += 1;
        }
        tracing::info!(records = count, terms = self.index.len(), "keyword index built");
    }

    /// Ids of records sharing at least one token with the query (logical OR
    /// across query tokens), truncated to `limit`.
    ///
    /// Matches are a set union and carry no relevance rank. Ids are returned
    /// in ascending order purely so results are deterministic; the ordering
    /// is not a quality signal.
    pub fn search(&self, query: &str, limit: usize) -> Vec<i64> {
        let mut matches: HashSet<i64> = HashSet::new();
        for token in tokenize(query) {
            if let Some(ids) = self.index.get(&token) {
                matches.extend(ids);
            }
        }

        let mut ids: Vec<i64> = matches.into_iter().collect();
        ids.sort_unstable();
        ids.truncate(limit);
        ids
    }
}

/// Maximal runs of word characters (alphanumeric or `_`), case-folded.
/// Everything else separates tokens and is discarded.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
