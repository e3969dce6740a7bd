//! HTTP API server.
//!
//! Exposes the knowledge base over JSON for dashboards and integrations.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check with document/vector counts |
//! | `GET`  | `/api/hts/search?q=` | Search tariff codes by description |
//! | `GET`  | `/api/hts/{hts_number}` | Tariff-code detail |
//! | `GET`  | `/api/search?q=` | Semantic document search with optional filters |
//! | `GET`  | `/api/documents/{document_number}` | Full document detail |
//! | `GET`  | `/api/status` | Counts and recent ingestion runs |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: 2025-00001" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `embeddings_disabled` (400), `internal` (500), `unhealthy` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based dashboards.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{DocumentDetail, HtsCode, IngestionRun, SearchHit};
use crate::retrieval::RetrievalEngine;
use crate::store::Store;
use crate::vector::{SearchFilters, VectorIndex};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Start the HTTP server on the configured bind address.
///
/// When an embedding provider is configured its output dimension is
/// verified before the listener binds, so a misconfigured model aborts
/// startup instead of serving corrupted semantic search.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if config.embedding.is_enabled() {
        embedding::verify_dimension(&config.embedding).await?;
    }

    let pool = db::connect(config).await?;
    let bind_addr = config.server.bind.clone();

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/hts/search", get(handle_hts_search))
        .route("/api/hts/{hts_number}", get(handle_hts_get))
        .route("/api/search", get(handle_search))
        .route("/api/documents/{document_number}", get(handle_document_get))
        .route("/api/status", get(handle_status))
        .layer(cors)
        .with_state(state);

    println!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn unhealthy(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unhealthy".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: i64,
    vectors: i64,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let store = Store::new(&state.pool);
    let documents = store.document_count().await.map_err(unhealthy)?;
    let vectors = VectorIndex::new(&state.pool).count().await.map_err(unhealthy)?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents,
        vectors,
    }))
}

// ============ GET /api/hts/search ============

#[derive(Deserialize)]
struct HtsSearchParams {
    q: String,
    #[serde(default = "default_hts_limit")]
    limit: i64,
}

fn default_hts_limit() -> i64 {
    10
}

async fn handle_hts_search(
    State(state): State<AppState>,
    Query(params): Query<HtsSearchParams>,
) -> Result<Json<Vec<HtsCode>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }

    let codes = Store::new(&state.pool)
        .search_hts_codes(&params.q, params.limit.clamp(1, 100))
        .await
        .map_err(internal)?;

    Ok(Json(codes))
}

// ============ GET /api/hts/{hts_number} ============

async fn handle_hts_get(
    State(state): State<AppState>,
    Path(hts_number): Path<String>,
) -> Result<Json<HtsCode>, AppError> {
    let code = Store::new(&state.pool)
        .get_hts_code(&hts_number)
        .await
        .map_err(internal)?;

    match code {
        Some(code) => Ok(Json(code)),
        None => Err(not_found(format!("HTS code not found: {}", hts_number))),
    }
}

// ============ GET /api/search ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
    score_threshold: Option<f32>,
    hts_code: Option<String>,
    agency: Option<String>,
    source: Option<String>,
}

fn default_search_limit() -> usize {
    5
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    if !state.config.embedding.is_enabled() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            code: "embeddings_disabled".to_string(),
            message: "semantic search requires an embedding provider".to_string(),
        });
    }

    let filters = SearchFilters {
        hts_codes: params.hts_code.into_iter().collect(),
        agencies: params.agency.into_iter().collect(),
        source: params.source,
    };

    let engine = RetrievalEngine::new((*state.config).clone(), state.pool.clone());
    let hits = engine
        .search(
            &params.q,
            params.limit.clamp(1, 50),
            params.score_threshold,
            &filters,
        )
        .await
        .map_err(internal)?;

    Ok(Json(hits))
}

// ============ GET /api/documents/{document_number} ============

async fn handle_document_get(
    State(state): State<AppState>,
    Path(document_number): Path<String>,
) -> Result<Json<DocumentDetail>, AppError> {
    let engine = RetrievalEngine::new((*state.config).clone(), state.pool.clone());
    let detail = engine
        .document_detail(&document_number)
        .await
        .map_err(internal)?;

    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(not_found(format!(
            "document not found: {}",
            document_number
        ))),
    }
}

// ============ GET /api/status ============

#[derive(Serialize)]
struct StatusResponse {
    documents_count: i64,
    hts_codes_count: i64,
    vector_points: i64,
    recent_ingestions: Vec<IngestionRun>,
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let store = Store::new(&state.pool);

    let documents_count = store.document_count().await.map_err(internal)?;
    let hts_codes_count = store.hts_count().await.map_err(internal)?;
    let vector_points = VectorIndex::new(&state.pool).count().await.map_err(internal)?;
    let recent_ingestions = store.recent_ingestion_runs(5).await.map_err(internal)?;

    Ok(Json(StatusResponse {
        documents_count,
        hts_codes_count,
        vector_points,
        recent_ingestions,
    }))
}
