//! HTTP API server.
//!
//! Exposes the retrieval core over a JSON REST API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/collections` | Create a collection |
//! | `GET` | `/api/v1/collections` | List collections |
//! | `GET` | `/api/v1/collections/:name` | Collection statistics |
//! | `DELETE` | `/api/v1/collections/:name` | Delete a collection |
//! | `POST` | `/api/v1/documents` | Ingest a document |
//! | `GET` | `/api/v1/collections/:name/documents` | List documents |
//! | `DELETE` | `/api/v1/documents/:id` | Delete a document |
//! | `DELETE` | `/api/v1/collections/:name/documents` | Delete all documents |
//! | `POST` | `/api/v1/query` | Full RAG query (retrieval + answer) |
//! | `POST` | `/api/v1/search` | Pure retrieval, no answer generation |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses are JSON:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query is required" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `upstream_unavailable`
//! (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the desktop client and
//! browser-based tools call this API cross-origin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::RagEngine;
use crate::error::RagError;
use crate::models::{AddDocumentRequest, QueryRequest};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<RagEngine>,
}

/// Starts the HTTP server on `bind` and serves until the process exits.
pub async fn run_server(engine: Arc<RagEngine>, bind: &str) -> anyhow::Result<()> {
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/api/v1/collections",
            post(handle_create_collection).get(handle_list_collections),
        )
        .route(
            "/api/v1/collections/:name",
            get(handle_collection_stats).delete(handle_delete_collection),
        )
        .route(
            "/api/v1/collections/:name/documents",
            get(handle_list_documents).delete(handle_delete_all_documents),
        )
        .route("/api/v1/documents", post(handle_add_document))
        .route("/api/v1/documents/:id", delete(handle_delete_document))
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/search", post(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("recall server listening on http://{bind}");

    let listener = tokio::net::TcpListener::bind(bind).await?;
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RagError::UpstreamUnavailable(_) | RagError::OversizedInput(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_unavailable")
            }
            RagError::DimensionMismatch { .. } | RagError::StorageFault(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Collections ============

#[derive(Deserialize)]
struct CreateCollectionRequest {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_create_collection(
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .engine
        .store()
        .create_collection(&req.name, &req.description)
        .await?;
    Ok(Json(MessageResponse {
        message: format!("collection '{}' created", req.name),
    }))
}

async fn handle_list_collections(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let collections = state.engine.store().list_collections().await?;
    Ok(Json(serde_json::json!({ "collections": collections })))
}

async fn handle_collection_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.engine.store().collection_stats(&name).await?;
    Ok(Json(stats))
}

async fn handle_delete_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.engine.store().delete_collection(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("collection '{name}' deleted"),
    }))
}

// ============ Documents ============

#[derive(Serialize)]
struct AddDocumentResponse {
    document_id: String,
    chunk_count: usize,
    chunking_strategy: serde_json::Value,
}

async fn handle_add_document(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<Json<AddDocumentResponse>, AppError> {
    let doc = state.engine.add_document(&req).await?;
    Ok(Json(AddDocumentResponse {
        document_id: doc.id,
        chunk_count: doc.chunks.len(),
        chunking_strategy: doc
            .metadata
            .get("chunking_strategy")
            .cloned()
            .unwrap_or_default(),
    }))
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let documents = state.engine.store().list_documents(&name).await?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.engine.store().delete_document(&id).await?;
    Ok(Json(MessageResponse {
        message: format!("document '{id}' deleted"),
    }))
}

async fn handle_delete_all_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let deleted = state.engine.store().delete_all_documents(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("deleted {deleted} documents from '{name}'"),
    }))
}

// ============ Query / Search ============

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.engine.query(&req).await?;
    Ok(Json(response))
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.engine.retrieve(&req).await?;
    Ok(Json(response))
}

// ============ Health ============

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
