//! HTTP API server.
//!
//! Exposes mailmind over a JSON HTTP API for UI frontends and automation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/search` | Keyword/semantic/hybrid search |
//! | `POST` | `/sync` | Fetch, store, and index new mail |
//! | `POST` | `/chat` | Chat grounded in the archive |
//! | `POST` | `/draft` | Generate an email draft |
//! | `GET`  | `/emails/recent` | Most recent emails |
//! | `GET`  | `/emails/{id}` | Full email by id |
//!
//! # Error Contract
//!
//! All error responses share one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `misconfigured`
//! (400), `internal` (500). Configuration problems (disabled providers,
//! index dimensionality disagreements) surface as `misconfigured`; a search
//! that merely finds less than expected is an ordinary shorter result list.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::ChatService;
use crate::config::Config;
use crate::db;
use crate::draft::DraftingService;
use crate::embedding::create_embedder;
use crate::indexer::IndexCoordinator;
use crate::ingest::IngestionService;
use crate::keyword_index::KeywordIndex;
use crate::llm::{create_generator, ChatMessage};
use crate::mail::create_mail_client;
use crate::migrate;
use crate::models::EmailRecord;
use crate::retrieval::SearchService;
use crate::store::{EmailStore, SqliteEmailStore};
use crate::summarize::create_summarizer;
use crate::vector_index::VectorIndex;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<dyn EmailStore>,
    /// Present when an embedding provider is configured.
    search: Option<Arc<SearchService>>,
    /// Present when a generation provider is configured.
    chat: Option<Arc<ChatService>>,
    drafting: Option<Arc<DraftingService>>,
    /// Present when both mail and embedding providers are configured.
    ingestion: Option<Arc<IngestionService>>,
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind` and serves until the process terminates.
/// Schema migrations run first, so a fresh database works without a
/// separate `init`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = build_state(config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/sync", post(handle_sync))
        .route("/chat", post(handle_chat))
        .route("/draft", post(handle_draft))
        .route("/emails/recent", get(handle_recent))
        .route("/emails/{id}", get(handle_get_email))
        .layer(cors)
        .with_state(state);

    println!("mailmind server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire up every service the configuration enables.
async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store: Arc<dyn EmailStore> = Arc::new(SqliteEmailStore::new(pool));

    let mut search = None;
    let mut ingestion = None;

    if config.embedding.is_enabled() {
        let embedder = create_embedder(&config.embedding)?;
        // dims is validated non-zero whenever embedding is enabled.
        let dims = config.embedding.dims.unwrap_or(0);
        let vector_index = Arc::new(RwLock::new(VectorIndex::open(
            dims,
            &config.vector_index.path,
        )?));
        let keyword_index = Arc::new(RwLock::new(KeywordIndex::new()));

        search = Some(Arc::new(SearchService::new(
            store.clone(),
            embedder.clone(),
            vector_index.clone(),
        )));

        if config.mail.is_enabled() {
            let coordinator =
                IndexCoordinator::new(embedder, vector_index, keyword_index);
            let summarizer = if config.summarizer.is_enabled() {
                Some(create_summarizer(&config.summarizer)?)
            } else {
                None
            };
            ingestion = Some(Arc::new(IngestionService::new(
                create_mail_client(&config.mail)?,
                store.clone(),
                summarizer,
                coordinator,
            )));
        }
    }

    let (chat, drafting) = if config.generation.is_enabled() {
        let generator = create_generator(&config.generation)?;
        match &search {
            Some(search) => (
                Some(Arc::new(ChatService::new(search.clone(), generator.clone()))),
                Some(Arc::new(DraftingService::new(search.clone(), generator))),
            ),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    Ok(AppState {
        config: Arc::new(config.clone()),
        store,
        search,
        chat,
        drafting,
        ingestion,
    })
}

// ============ Error response ============

/// JSON error envelope.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// A provider the request needs is disabled or misconfigured.
fn misconfigured(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "misconfigured".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map service errors to the most appropriate HTTP error. Index and
/// provider-configuration failures indicate an operator problem, not a bad
/// request, and get the `misconfigured` code.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);

    if msg.contains("not found") {
        not_found(msg)
    } else if msg.contains("disabled")
        || msg.contains("dimension")
        || msg.contains("dims")
        || msg.contains("OPENAI_API_KEY")
        || msg.contains("token file")
    {
        misconfigured(msg)
    } else if msg.contains("must not be empty") || msg.contains("Unknown search mode") {
        bad_request(msg)
    } else {
        internal(msg)
    }
}

// ============ Wire shapes ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    limit: Option<usize>,
}

fn default_mode() -> String {
    "semantic".to_string()
}

/// Listing shape: metadata plus summary, no bodies.
#[derive(Serialize)]
struct EmailSummary {
    id: i64,
    subject: String,
    from_address: String,
    to_addresses: String,
    date: String,
    summary: Option<String>,
}

impl EmailSummary {
    fn from_record(record: &EmailRecord) -> Self {
        Self {
            id: record.id,
            subject: record.subject.clone(),
            from_address: record.from_address.clone(),
            to_addresses: record.to_addresses.clone(),
            date: format_ts_iso(record.date),
            summary: record.summary.clone(),
        }
    }
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<EmailSummary>,
}

#[derive(Serialize)]
struct EmailDetail {
    id: i64,
    message_id: String,
    thread_id: String,
    subject: String,
    from_address: String,
    to_addresses: String,
    cc_addresses: Option<String>,
    bcc_addresses: Option<String>,
    date: String,
    summary: Option<String>,
    plain_text: String,
}

#[derive(Deserialize)]
struct SyncRequest {
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    200
}

#[derive(Serialize)]
struct SyncResponse {
    imported: usize,
    indexed: usize,
}

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Deserialize)]
struct DraftRequest {
    instruction: String,
    #[serde(default)]
    related_query: Option<String>,
}

#[derive(Serialize)]
struct DraftResponse {
    draft: String,
}

#[derive(Deserialize)]
struct RecentParams {
    #[serde(default)]
    limit: Option<usize>,
}

// ============ Handlers ============

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = req.limit.unwrap_or(state.config.retrieval.final_limit);

    let results = match req.mode.as_str() {
        "keyword" => state
            .store
            .search_text(&req.query, limit)
            .await
            .map_err(classify_error)?,
        "semantic" | "hybrid" => {
            let search = state.search.as_ref().ok_or_else(|| {
                misconfigured(format!(
                    "mode '{}' requires an embedding provider; set [embedding] in config",
                    req.mode
                ))
            })?;
            if req.mode == "semantic" {
                search
                    .search_semantic(&req.query, limit)
                    .await
                    .map_err(classify_error)?
            } else {
                search
                    .search_hybrid(&req.query, limit)
                    .await
                    .map_err(classify_error)?
            }
        }
        other => {
            return Err(bad_request(format!(
                "Unknown search mode: {}. Use keyword, semantic, or hybrid.",
                other
            )))
        }
    };

    Ok(Json(SearchResponse {
        results: results.iter().map(EmailSummary::from_record).collect(),
    }))
}

async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let ingestion = state.ingestion.as_ref().ok_or_else(|| {
        misconfigured("sync requires [mail] and [embedding] providers in config")
    })?;

    let report = ingestion
        .sync(req.max_results)
        .await
        .map_err(classify_error)?;

    Ok(Json(SyncResponse {
        imported: report.stored,
        indexed: report.indexed,
    }))
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let chat = state.chat.as_ref().ok_or_else(|| {
        misconfigured("chat requires [generation] and [embedding] providers in config")
    })?;
    if req.messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }

    let top_k = req.top_k.unwrap_or(state.config.retrieval.chat_top_k);
    let reply = chat
        .chat_with_emails(&req.messages, top_k)
        .await
        .map_err(classify_error)?;

    Ok(Json(ChatResponse { reply }))
}

async fn handle_draft(
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<DraftResponse>, AppError> {
    let drafting = state.drafting.as_ref().ok_or_else(|| {
        misconfigured("draft requires [generation] and [embedding] providers in config")
    })?;
    if req.instruction.trim().is_empty() {
        return Err(bad_request("instruction must not be empty"));
    }

    let draft = drafting
        .draft_email(&req.instruction, req.related_query.as_deref())
        .await
        .map_err(classify_error)?;

    Ok(Json(DraftResponse { draft }))
}

async fn handle_recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let limit = params.limit.unwrap_or(state.config.retrieval.final_limit);
    let results = state
        .store
        .list_recent(limit)
        .await
        .map_err(classify_error)?;

    Ok(Json(SearchResponse {
        results: results.iter().map(EmailSummary::from_record).collect(),
    }))
}

async fn handle_get_email(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmailDetail>, AppError> {
    let record = state
        .store
        .get_email(id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("email not found: {}", id)))?;

    Ok(Json(EmailDetail {
        id: record.id,
        message_id: record.message_id,
        thread_id: record.thread_id,
        subject: record.subject,
        from_address: record.from_address,
        to_addresses: record.to_addresses,
        cc_addresses: record.cc_addresses,
        bcc_addresses: record.bcc_addresses,
        date: format_ts_iso(record.date),
        summary: record.summary,
        plain_text: record.plain_text,
    }))
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_disabled_is_misconfigured() {
        let err = anyhow::anyhow!("embedding provider is disabled");
        let mapped = classify_error(err);
        assert_eq!(mapped.code, "misconfigured");
        assert_eq!(mapped.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_classify_dimension_is_misconfigured() {
        let err = anyhow::Error::from(crate::vector_index::IndexError::DimensionMismatch {
            expected: 1536,
            got: 768,
        });
        assert_eq!(classify_error(err).code, "misconfigured");
    }

    #[test]
    fn test_classify_not_found() {
        let err = anyhow::anyhow!("email not found: 7");
        let mapped = classify_error(err);
        assert_eq!(mapped.code, "not_found");
        assert_eq!(mapped.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_classify_unknown_is_internal() {
        let err = anyhow::anyhow!("database is on fire");
        assert_eq!(classify_error(err).code, "internal");
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
