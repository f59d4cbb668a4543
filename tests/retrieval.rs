//! End-to-end retrieval tests: store → coordinator → search, over a real
//! SQLite file and a deterministic embedder. No network, no external
//! services.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tempfile::TempDir;

use mailmind::embedding::EmbeddingProvider;
use mailmind::indexer::IndexCoordinator;
use mailmind::keyword_index::KeywordIndex;
use mailmind::migrate;
use mailmind::models::NewEmail;
use mailmind::retrieval::SearchService;
use mailmind::store::{EmailStore, SqliteEmailStore};
use mailmind::vector_index::VectorIndex;
use mailmind::{db, ingest};

const DIMS: usize = 8;

/// Embedder deriving a stable vector from text bytes: identical texts embed
/// identically, no network involved.
struct FakeEmbedder;

impl FakeEmbedder {
    fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIMS] += f32::from(b) / 255.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

struct Harness {
    _tmp: TempDir,
    store: Arc<SqliteEmailStore>,
    vector_index: Arc<RwLock<VectorIndex>>,
    keyword_index: Arc<RwLock<KeywordIndex>>,
    coordinator: IndexCoordinator,
    search: SearchService,
    index_path: std::path::PathBuf,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data").join("mailmind.db");
    let index_path = tmp.path().join("data").join("vectors.idx");

    let pool = db::connect(&db_path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteEmailStore::new(pool));

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbedder);
    let vector_index = Arc::new(RwLock::new(
        VectorIndex::open(DIMS, &index_path).unwrap(),
    ));
    let keyword_index = Arc::new(RwLock::new(KeywordIndex::new()));

    let coordinator = IndexCoordinator::new(
        embedder.clone(),
        vector_index.clone(),
        keyword_index.clone(),
    );
    let search = SearchService::new(store.clone(), embedder, vector_index.clone());

    Harness {
        _tmp: tmp,
        store,
        vector_index,
        keyword_index,
        coordinator,
        search,
        index_path,
    }
}

fn email(message_id: &str, subject: &str, body: &str, date: i64) -> NewEmail {
    NewEmail {
        message_id: message_id.to_string(),
        thread_id: format!("t-{message_id}"),
        from_address: "alice@example.com".to_string(),
        to_addresses: "me@example.com".to_string(),
        cc_addresses: None,
        bcc_addresses: None,
        subject: subject.to_string(),
        raw_html: format!("<p>{body}</p>"),
        plain_text: body.to_string(),
        summary: None,
        date,
    }
}

/// Save a batch, read the persisted records back by id, index them.
async fn ingest_batch(h: &Harness, emails: &[NewEmail]) -> Vec<i64> {
    let ids = h.store.save_emails(emails).await.unwrap();
    let mut persisted = Vec::new();
    for &id in &ids {
        persisted.push(h.store.get_email(id).await.unwrap().unwrap());
    }
    h.coordinator.index_emails(&persisted).await.unwrap();
    ids
}

#[tokio::test]
async fn test_save_assigns_stable_ids_and_upserts() {
    let h = harness().await;

    let first = h
        .store
        .save_emails(&[email("m1", "hello", "world", 100)])
        .await
        .unwrap();
    // Same message id again: no new record, same id.
    let second = h
        .store
        .save_emails(&[email("m1", "hello (edited)", "world again", 200)])
        .await
        .unwrap();

    assert_eq!(first, second);
    let record = h.store.get_email(first[0]).await.unwrap().unwrap();
    assert_eq!(record.subject, "hello (edited)");
    assert_eq!(h.store.list_recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_search_text_is_case_insensitive_and_recent_first() {
    let h = harness().await;
    h.store
        .save_emails(&[
            email("m1", "Kubernetes upgrade", "cluster notes", 100),
            email("m2", "lunch", "no cluster here at all... actually cluster", 300),
            email("m3", "other", "unrelated", 200),
        ])
        .await
        .unwrap();

    let results = h.store.search_text("CLUSTER", 10).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m1"]);
}

#[tokio::test]
async fn test_semantic_search_returns_exact_match_first() {
    let h = harness().await;
    ingest_batch(
        &h,
        &[
            email("m1", "budget", "quarterly budget numbers", 100),
            email("m2", "poetry", "an ode to the sea", 200),
        ],
    )
    .await;

    let results = h
        .search
        .search_semantic("quarterly budget numbers", 5)
        .await
        .unwrap();
    assert_eq!(results[0].message_id, "m1");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_semantic_search_empty_archive() {
    let h = harness().await;
    let results = h.search.search_semantic("anything", 5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_semantic_skips_ids_missing_from_store() {
    let h = harness().await;
    ingest_batch(&h, &[email("m1", "real", "the real body", 100)]).await;

    // Plant an index entry whose record does not exist.
    h.vector_index
        .write()
        .add_items(&[9999], &[FakeEmbedder::vector_for("the real body")])
        .unwrap();

    let results = h.search.search_semantic("the real body", 10).await.unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
    assert!(!ids.contains(&9999));
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_hybrid_properties() {
    let h = harness().await;
    let limit = 4;
    ingest_batch(
        &h,
        &[
            email("m1", "deploy", "rollout plan for deploy", 100),
            email("m2", "deploy question", "when is the deploy happening", 200),
            email("m3", "groceries", "milk and deploy... eggs", 300),
            email("m4", "unrelated", "nothing to see", 400),
            email("m5", "also unrelated", "still nothing", 500),
        ],
    )
    .await;

    let semantic = h
        .search
        .search_semantic("rollout plan for deploy", limit)
        .await
        .unwrap();
    let hybrid = h
        .search
        .search_hybrid("rollout plan for deploy", limit)
        .await
        .unwrap();

    // Bounded by the limit, no duplicate ids.
    assert!(hybrid.len() <= limit);
    let ids: Vec<i64> = hybrid.iter().map(|r| r.id).collect();
    let unique: std::collections::HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());

    // The semantic prefix is preserved verbatim: every semantic id appears
    // before every keyword-only id.
    let semantic_ids: Vec<i64> = semantic.iter().map(|r| r.id).collect();
    assert_eq!(&ids[..semantic_ids.len().min(ids.len())], &semantic_ids[..semantic_ids.len().min(ids.len())]);
}

#[tokio::test]
async fn test_keyword_index_tracks_batches() {
    let h = harness().await;
    let ids = ingest_batch(
        &h,
        &[
            email("m1", "hello world", "", 100),
            email("m2", "world peace", "", 200),
        ],
    )
    .await;

    let keyword = h.keyword_index.read();
    assert_eq!(keyword.search("world", 10), ids);
    assert_eq!(keyword.search("hello", 10), vec![ids[0]]);
    assert!(keyword.search("xyz", 10).is_empty());
}

#[tokio::test]
async fn test_vector_index_persists_across_reopen() {
    let h = harness().await;
    ingest_batch(
        &h,
        &[
            email("m1", "a", "first body text", 100),
            email("m2", "b", "second body text", 200),
        ],
    )
    .await;

    let probe = FakeEmbedder::vector_for("first body text");
    let before = h.vector_index.read().search(&probe, 10).unwrap();

    let reopened = VectorIndex::open(DIMS, &h.index_path).unwrap();
    let after = reopened.search(&probe, 10).unwrap();

    assert_eq!(before, after);
    assert_eq!(reopened.len(), 2);
}

#[tokio::test]
async fn test_ingestion_service_end_to_end() {
    use mailmind::mail::MailClient;
    use mailmind::models::RawMessage;

    struct FixtureMail;

    #[async_trait]
    impl MailClient for FixtureMail {
        async fn fetch_messages(&self, _max_results: usize) -> Result<Vec<RawMessage>> {
            Ok(vec![RawMessage {
                message_id: "w1".to_string(),
                thread_id: "t1".to_string(),
                subject: "Welcome aboard".to_string(),
                from_address: "hr@example.com".to_string(),
                to_addresses: "me@example.com".to_string(),
                cc_addresses: None,
                bcc_addresses: None,
                raw_html: "<html><body><p>Your first day is <b>Monday</b>.</p></body></html>"
                    .to_string(),
                date: 1_700_000_000,
            }])
        }
    }

    let h = harness().await;
    let coordinator = IndexCoordinator::new(
        Arc::new(FakeEmbedder),
        h.vector_index.clone(),
        h.keyword_index.clone(),
    );
    let service = ingest::IngestionService::new(
        Arc::new(FixtureMail),
        h.store.clone(),
        None,
        coordinator,
    );

    let report = service.sync(50).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.stored, 1);
    assert_eq!(report.indexed, 1);

    // HTML cleaned before storage; the record is immediately searchable.
    let saved = h.store.get_by_message_id("w1").await.unwrap().unwrap();
    assert_eq!(saved.plain_text, "Your first day is Monday .");

    let results = h.store.search_text("monday", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(h.vector_index.read().len(), 1);
}
