//! Index orchestration: keeps the vector and keyword indexes in step with
//! newly stored records.
//!
//! One coordinator call embeds a whole batch, updates the vector index
//! (which persists itself), then rebuilds the keyword index over the same
//! batch — strictly in that order. There is no transaction spanning the two
//! indexes: if the keyword step were ever to fail after the vector step
//! succeeded, the vector additions stay. Retrieval treats a record present
//! in one index but not the other as ordinary, not anomalous.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::keyword_index::KeywordIndex;
use crate::models::EmailRecord;
use crate::vector_index::VectorIndex;

/// Coordinates semantic and keyword index updates.
///
/// Index instances are shared with the retrieval side; the coordinator takes
/// the write lock only around the in-memory mutation, never across an await.
/// Concurrent `index_emails` calls on the same instances are not supported —
/// callers serialize them.
pub struct IndexCoordinator {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_index: Arc<RwLock<VectorIndex>>,
    keyword_index: Arc<RwLock<KeywordIndex>>,
}

impl IndexCoordinator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_index: Arc<RwLock<VectorIndex>>,
        keyword_index: Arc<RwLock<KeywordIndex>>,
    ) -> Self {
        Self {
            embedder,
            vector_index,
            keyword_index,
        }
    }

    /// Embed and index a batch of persisted records. Returns the number of
    /// records indexed; an empty batch is a no-op returning 0.
    pub async fn index_emails(&self, emails: &[EmailRecord]) -> Result<usize> {
        if emails.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = emails.iter().map(|e| e.plain_text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .context("failed to embed email batch")?;
        let ids: Vec<i64> = emails.iter().map(|e| e.id).collect();

        // Vector index first; persists before the keyword rebuild starts.
        self.vector_index
            .write()
            .add_items(&ids, &vectors)
            .context("failed to add embeddings to vector index")?;

        self.keyword_index.write().build(emails.iter());

        tracing::info!(count = emails.len(), "indexed email batch");
        Ok(emails.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{records, FakeEmbedder};

    fn coordinator(dir: &tempfile::TempDir) -> (IndexCoordinator, Arc<RwLock<VectorIndex>>, Arc<RwLock<KeywordIndex>>) {
        let embedder = Arc::new(FakeEmbedder::new(4));
        let vector = Arc::new(RwLock::new(VectorIndex::create(
            4,
            dir.path().join("vectors.idx"),
        )));
        let keyword = Arc::new(RwLock::new(KeywordIndex::new()));
        (
            IndexCoordinator::new(embedder.clone(), vector.clone(), keyword.clone()),
            vector,
            keyword,
        )
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let (coordinator, vector, keyword) = coordinator(&dir);

        let indexed = coordinator.index_emails(&[]).await.unwrap();
        assert_eq!(indexed, 0);
        assert!(vector.read().is_empty());
        assert_eq!(keyword.read().term_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_lands_in_both_indexes() {
        let dir = tempfile::TempDir::new().unwrap();
        let (coordinator, vector, keyword) = coordinator(&dir);
        let batch = records(&[(1, "standup", "notes from monday"), (2, "deploy", "friday rollout")]);

        let indexed = coordinator.index_emails(&batch).await.unwrap();
        assert_eq!(indexed, 2);
        assert_eq!(vector.read().len(), 2);
        assert_eq!(keyword.read().search("rollout", 10), vec![2]);
        assert_eq!(keyword.read().search("standup", 10), vec![1]);
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_keyword_index_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let embedder = Arc::new(crate::embedding::DisabledEmbedder);
        let vector = Arc::new(RwLock::new(VectorIndex::create(
            4,
            dir.path().join("vectors.idx"),
        )));
        let keyword = Arc::new(RwLock::new(KeywordIndex::new()));
        let coordinator =
            IndexCoordinator::new(embedder, vector.clone(), keyword.clone());

        let batch = records(&[(1, "subject", "body")]);
        assert!(coordinator.index_emails(&batch).await.is_err());
        assert!(vector.read().is_empty());
        assert_eq!(keyword.read().term_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_width_embedder_fails_before_keyword_build() {
        let dir = tempfile::TempDir::new().unwrap();
        // Index is 8-wide, embedder produces 4-wide vectors.
        let embedder = Arc::new(FakeEmbedder::new(4));
        let vector = Arc::new(RwLock::new(VectorIndex::create(
            8,
            dir.path().join("vectors.idx"),
        )));
        let keyword = Arc::new(RwLock::new(KeywordIndex::new()));
        let coordinator =
            IndexCoordinator::new(embedder, vector.clone(), keyword.clone());

        let batch = records(&[(1, "subject", "body")]);
        let err = coordinator.index_emails(&batch).await.unwrap_err();
        assert!(err.to_string().contains("vector index"));
        assert!(vector.read().is_empty());
        assert_eq!(keyword.read().term_count(), 0);
    }
}
