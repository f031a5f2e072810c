//! HTTP adapter.
//!
//! A thin JSON layer over the [`Engine`]; every handler maps a request onto
//! exactly one engine operation. PDF payloads travel base64-encoded inside
//! JSON bodies.
//!
//! # Endpoints
//!
//! | Method   | Path                  | Description |
//! |----------|-----------------------|-------------|
//! | `POST`   | `/documents`          | Upload and index a PDF |
//! | `GET`    | `/documents`          | List a tenant's documents |
//! | `DELETE` | `/documents/{id}`     | Delete a document (cascading) |
//! | `POST`   | `/chat`               | Ask a question within a session |
//! | `GET`    | `/history`            | Recent turns of a session |
//! | `GET`    | `/health`             | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document abc" } }
//! ```
//!
//! Codes map from the engine taxonomy: `ingestion_failed` (422),
//! `service_unavailable` (503), `not_found` (404), `tenant_mismatch` (403),
//! `bad_request` (400), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::{Answer, Document, Turn};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Start the HTTP server on `bind_addr`, serving until the process exits.
pub async fn run_server(engine: Arc<Engine>, bind_addr: &str) -> anyhow::Result<()> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/documents", post(handle_upload).get(handle_list))
        .route("/documents/{id}", delete(handle_delete))
        .route("/chat", post(handle_chat))
        .route("/history", get(handle_history))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!("server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
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

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let (status, code) = match &err {
            EngineError::Ingestion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ingestion_failed"),
            EngineError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::TenantMismatch(_) => (StatusCode::FORBIDDEN, "tenant_mismatch"),
            EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

// ============ Response shapes ============

/// Document metadata without the raw text body.
#[derive(Serialize)]
struct DocumentSummary {
    id: String,
    filename: String,
    page_count: i64,
    char_count: i64,
    uploaded_at: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        DocumentSummary {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            page_count: doc.page_count,
            char_count: doc.char_count,
            uploaded_at: format_ts_iso(doc.uploaded_at),
            status: doc.status.as_str().to_string(),
            failure_reason: doc.failure_reason.clone(),
        }
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
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

// ============ POST /documents ============

#[derive(Deserialize)]
struct UploadRequest {
    tenant: String,
    filename: String,
    /// Base64-encoded PDF bytes.
    content_base64: String,
}

#[derive(Serialize)]
struct UploadResponse {
    document: DocumentSummary,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if req.tenant.trim().is_empty() {
        return Err(bad_request("tenant must not be empty"));
    }
    if req.filename.trim().is_empty() {
        return Err(bad_request("filename must not be empty"));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.content_base64)
        .map_err(|e| bad_request(format!("content_base64 is not valid base64: {}", e)))?;

    let doc = state
        .engine
        .ingest_document(&req.tenant, &req.filename, &bytes)
        .await?;
    Ok(Json(UploadResponse {
        document: DocumentSummary::from(&doc),
    }))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct TenantQuery {
    tenant: String,
}

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let docs = state.engine.list_documents(&query.tenant).await?;
    Ok(Json(ListResponse {
        documents: docs.iter().map(DocumentSummary::from).collect(),
    }))
}

// ============ DELETE /documents/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.engine.delete_document(&query.tenant, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    tenant: String,
    session_id: String,
    q: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    grounded: bool,
    cited_document_ids: Vec<String>,
    sources: Vec<String>,
}

impl From<Answer> for ChatResponse {
    fn from(a: Answer) -> Self {
        ChatResponse {
            answer: a.text,
            grounded: a.grounded,
            cited_document_ids: a.cited_document_ids,
            sources: a.sources,
        }
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.tenant.trim().is_empty() || req.q.trim().is_empty() {
        return Err(bad_request("tenant and q are required"));
    }
    let session_id = if req.session_id.trim().is_empty() {
        "default".to_string()
    } else {
        req.session_id
    };

    let answer = state.engine.chat(&req.tenant, &session_id, &req.q).await?;
    Ok(Json(ChatResponse::from(answer)))
}

// ============ GET /history ============

#[derive(Deserialize)]
struct HistoryQuery {
    tenant: String,
    session_id: String,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    20
}

#[derive(Serialize)]
struct HistoryResponse {
    turns: Vec<Turn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let turns = state
        .engine
        .history(&query.tenant, &query.session_id, query.limit)
        .await?;
    Ok(Json(HistoryResponse { turns }))
}
