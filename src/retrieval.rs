//! Keyword, semantic, and hybrid search over the email corpus.
//!
//! [`SearchService`] fronts the three retrieval modes:
//!
//! - **keyword** — substring search served by the record store directly.
//!   The in-memory [`KeywordIndex`](crate::keyword_index::KeywordIndex) is
//!   maintained by the coordinator and available as an API, but this path
//!   deliberately queries durable storage instead; see DESIGN.md for why
//!   that asymmetry is preserved rather than resolved.
//! - **semantic** — embed the query, take nearest neighbors from the vector
//!   index, resolve ids through the store. Index entries whose record has
//!   disappeared are skipped silently; that staleness window is expected.
//! - **hybrid** — semantic results first, then keyword results the semantic
//!   set didn't already contain, truncated to the limit. Semantic ordering
//!   always outranks keyword ordering.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::EmailRecord;
use crate::store::EmailStore;
use crate::vector_index::VectorIndex;

/// Retrieval engine over the record store and the vector index.
pub struct SearchService {
    store: Arc<dyn EmailStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<RwLock<VectorIndex>>,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn EmailStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<RwLock<VectorIndex>>,
    ) -> Self {
        Self {
            store,
            embedder,
            vector_index,
        }
    }

    /// Substring search over subject/body, most recent first. Served from
    /// the record store, not the in-memory keyword index.
    pub async fn search_keyword(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
        self.store
            .search_text(query, limit)
            .await
            .context("keyword search failed")
    }

    /// Nearest-neighbor search: embed the query, rank by ascending distance,
    /// resolve ids through the store. Dangling index entries are dropped
    /// without error.
    pub async fn search_semantic(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .context("failed to embed query")?;

        let hits = {
            let index = self.vector_index.read();
            index.search(&query_vec, limit)?
        };

        let mut results = Vec::with_capacity(hits.len());
        for (id, _distance) in hits {
            if let Some(record) = self.store.get_email(id).await? {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Semantic results followed by keyword results not already present.
    /// Stable dedup by id, first-seen (semantic) wins, truncated to `limit`.
    pub async fn search_hybrid(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
        let semantic = self.search_semantic(query, limit).await?;
        let keyword = self.search_keyword(query, limit).await?;

        let mut seen: HashSet<i64> = semantic.iter().map(|e| e.id).collect();
        let mut merged = semantic;
        for record in keyword {
            if seen.insert(record.id) {
                merged.push(record);
            }
        }
        merged.truncate(limit);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{records, FakeEmbedder};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Store double: records by id, keyword search returns a fixed id order.
    struct FixtureStore {
        by_id: HashMap<i64, EmailRecord>,
        keyword_order: Vec<i64>,
    }

    impl FixtureStore {
        fn new(records: Vec<EmailRecord>, keyword_order: Vec<i64>) -> Self {
            Self {
                by_id: records.into_iter().map(|r| (r.id, r)).collect(),
                keyword_order,
            }
        }
    }

    #[async_trait]
    impl EmailStore for FixtureStore {
        async fn save_emails(&self, _emails: &[crate::models::NewEmail]) -> Result<Vec<i64>> {
            unimplemented!("not used by retrieval tests")
        }

        async fn get_email(&self, id: i64) -> Result<Option<EmailRecord>> {
            Ok(self.by_id.get(&id).cloned())
        }

        async fn get_by_message_id(&self, _message_id: &str) -> Result<Option<EmailRecord>> {
            Ok(None)
        }

        async fn search_text(&self, _query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
            Ok(self
                .keyword_order
                .iter()
                .filter_map(|id| self.by_id.get(id).cloned())
                .take(limit)
                .collect())
        }

        async fn list_recent(&self, limit: usize) -> Result<Vec<EmailRecord>> {
            self.search_text("", limit).await
        }
    }

    /// Service whose vector index holds each record's body embedding.
    async fn fixture(
        specs: &[(i64, &str, &str)],
        keyword_order: Vec<i64>,
        extra_vector_ids: &[(i64, &str)],
    ) -> SearchService {
        let embedder = Arc::new(FakeEmbedder::new(8));
        let recs = records(specs);

        let dir = tempfile::TempDir::new().unwrap();
        let mut index = VectorIndex::create(8, dir.path().join("v.idx"));
        let ids: Vec<i64> = recs.iter().map(|r| r.id).collect();
        let vectors: Vec<Vec<f32>> = recs
            .iter()
            .map(|r| embedder.vector_for(&r.plain_text))
            .collect();
        index.add_items(&ids, &vectors).unwrap();
        for (id, text) in extra_vector_ids {
            index.add_items(&[*id], &[embedder.vector_for(text)]).unwrap();
        }

        let store = Arc::new(FixtureStore::new(recs, keyword_order));
        SearchService::new(store, embedder, Arc::new(RwLock::new(index)))
    }

    #[tokio::test]
    async fn test_semantic_returns_closest_first() {
        let service = fixture(
            &[
                (1, "a", "the quarterly budget meeting"),
                (2, "b", "lunch plans for friday"),
            ],
            vec![],
            &[],
        )
        .await;

        let results = service
            .search_semantic("the quarterly budget meeting", 5)
            .await
            .unwrap();
        assert_eq!(results[0].id, 1);
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_semantic_skips_dangling_index_entries() {
        // id 99 exists only in the vector index; its record is gone.
        let service = fixture(
            &[(1, "a", "hello world")],
            vec![],
            &[(99, "hello world exactly")],
        )
        .await;

        let results = service.search_semantic("hello world", 10).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_semantic_empty_index_is_empty_not_error() {
        let embedder = Arc::new(FakeEmbedder::new(8));
        let dir = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::create(8, dir.path().join("v.idx"));
        let store = Arc::new(FixtureStore::new(vec![], vec![]));
        let service = SearchService::new(store, embedder, Arc::new(RwLock::new(index)));

        let results = service.search_semantic("anything", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_semantic_block_precedes_keyword_only() {
        let service = fixture(
            &[
                (1, "a", "kubernetes upgrade runbook"),
                (2, "b", "totally unrelated poetry"),
                (3, "c", "another unrelated note"),
            ],
            // Keyword search surfaces 3 then 1 (1 also matches semantically).
            vec![3, 1],
            &[],
        )
        .await;

        let results = service
            .search_hybrid("kubernetes upgrade runbook", 10)
            .await
            .unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();

        // All three semantic hits come first (1 closest), then keyword-only
        // id 3 would duplicate — it is already present, so nothing repeats.
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], 1);
        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn test_hybrid_dedups_and_truncates() {
        let service = fixture(
            &[
                (1, "a", "alpha body"),
                (2, "b", "beta body"),
                (3, "c", "gamma body"),
                (4, "d", "delta body"),
            ],
            vec![4, 3, 2, 1],
            &[],
        )
        .await;

        let results = service.search_hybrid("alpha body", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 3);
        // Closest semantic match leads regardless of keyword order.
        assert_eq!(ids[0], 1);
    }

    #[tokio::test]
    async fn test_hybrid_keyword_only_fills_remaining_slots() {
        // Empty vector index: hybrid degenerates to keyword results.
        let embedder = Arc::new(FakeEmbedder::new(8));
        let dir = tempfile::TempDir::new().unwrap();
        let index = VectorIndex::create(8, dir.path().join("v.idx"));
        let recs = records(&[(1, "a", "x"), (2, "b", "y")]);
        let store = Arc::new(FixtureStore::new(recs, vec![2, 1]));
        let service = SearchService::new(store, embedder, Arc::new(RwLock::new(index)));

        let results = service.search_hybrid("whatever", 10).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
