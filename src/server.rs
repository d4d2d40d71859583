//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/upload` | Multipart file upload (`file`, optional `title`) |
//! | `POST` | `/api/upload/url` | Ingest a web page |
//! | `POST` | `/api/upload/text` | Ingest a free-text note |
//! | `POST` | `/api/search` | Ranked retrieval results |
//! | `POST` | `/api/ask` | Grounded answer with sources |
//! | `POST` | `/api/flashcards` | Flashcards about a topic |
//! | `POST` | `/api/summary` | Summary of a topic |
//! | `POST` | `/api/quiz` | Multiple-choice quiz about a topic |
//! | `GET`  | `/api/documents` | All ingested documents, newest first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends can
//! call the API directly.

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::app::KnowledgeBase;
use crate::config::Config;
use crate::ingest::IngestReceipt;
use crate::models::{Answer, Document, Flashcard, QuizItem, RetrievalResult};
use crate::retrieve::FilterCriteria;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Opens the knowledge base and serves the API on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let kb = Arc::new(KnowledgeBase::open(config).await?);
    let app = build_router(kb);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("kbase server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(kb: Arc<KnowledgeBase>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/upload/url", post(handle_upload_url))
        .route("/api/upload/text", post(handle_upload_text))
        .route("/api/search", post(handle_search))
        .route("/api/ask", post(handle_ask))
        .route("/api/flashcards", post(handle_flashcards))
        .route("/api/summary", post(handle_summary))
        .route("/api/quiz", post(handle_quiz))
        .route("/api/documents", get(handle_documents))
        .layer(cors)
        .with_state(kb)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("{:#}", err),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_count(count: Option<usize>, field: &str) -> Result<(), AppError> {
    if count == Some(0) {
        return Err(bad_request(format!("{} must be at least 1", field)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Ingestion ============

/// `multipart/form-data` with a `file` part and an optional `title` part.
async fn handle_upload(
    State(kb): State<Arc<KnowledgeBase>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestReceipt>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(|e| bad_request(e.body_text()))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|e| bad_request(e.body_text()))?);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("missing 'file' field"))?;
    let receipt = kb
        .processor
        .ingest_bytes(&filename, &bytes, title.as_deref())
        .await?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
struct UrlRequest {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

async fn handle_upload_url(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<IngestReceipt>, AppError> {
    let Json(req) = payload?;
    require(&req.url, "url")?;
    let receipt = kb.processor.ingest_url(&req.url, req.title.as_deref()).await?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
struct TextRequest {
    text: String,
    #[serde(default)]
    title: Option<String>,
}

async fn handle_upload_text(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<IngestReceipt>, AppError> {
    let Json(req) = payload?;
    require(&req.text, "text")?;
    let receipt = kb.processor.ingest_note(&req.text, req.title.as_deref()).await?;
    Ok(Json(receipt))
}

// ============ Retrieval ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    filter: Option<FilterCriteria>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievalResult>,
}

async fn handle_search(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = payload?;
    require(&req.query, "query")?;
    require_count(req.top_k, "top_k")?;
    let filter = req
        .filter
        .unwrap_or_default()
        .into_filter()
        .map_err(|e| bad_request(e.to_string()))?;

    let top_k = req.top_k.unwrap_or(kb.retriever.default_top_k());
    let results = kb.retriever.search(&req.query, &filter, top_k).await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Deserialize)]
struct AskRequest {
    query: String,
    #[serde(default)]
    filter: Option<FilterCriteria>,
}

async fn handle_ask(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = payload?;
    require(&req.query, "query")?;
    let filter = req
        .filter
        .unwrap_or_default()
        .into_filter()
        .map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(kb.retriever.answer(&req.query, &filter).await?))
}

// ============ Learning ============

#[derive(Deserialize)]
struct FlashcardRequest {
    topic: String,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Serialize)]
struct FlashcardResponse {
    flashcards: Vec<Flashcard>,
}

async fn handle_flashcards(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<FlashcardRequest>, JsonRejection>,
) -> Result<Json<FlashcardResponse>, AppError> {
    let Json(req) = payload?;
    require(&req.topic, "topic")?;
    require_count(req.count, "count")?;
    let flashcards = kb.learning.flashcards(&req.topic, req.count).await?;
    Ok(Json(FlashcardResponse { flashcards }))
}

#[derive(Deserialize)]
struct SummaryRequest {
    topic: String,
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
}

async fn handle_summary(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, AppError> {
    let Json(req) = payload?;
    require(&req.topic, "topic")?;
    let summary = kb.learning.summary(&req.topic).await?;
    Ok(Json(SummaryResponse { summary }))
}

#[derive(Deserialize)]
struct QuizRequest {
    topic: String,
    #[serde(default)]
    question_count: Option<usize>,
}

#[derive(Serialize)]
struct QuizResponse {
    quiz: Vec<QuizItem>,
}

async fn handle_quiz(
    State(kb): State<Arc<KnowledgeBase>>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<QuizResponse>, AppError> {
    let Json(req) = payload?;
    require(&req.topic, "topic")?;
    require_count(req.question_count, "question_count")?;
    let quiz = kb.learning.quiz(&req.topic, req.question_count).await?;
    Ok(Json(QuizResponse { quiz }))
}

// ============ GET /api/documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
}

async fn handle_documents(
    State(kb): State<Arc<KnowledgeBase>>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = kb.metadata.list_documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}
