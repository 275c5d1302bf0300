//! HTTP API.
//!
//! Exposes ingestion, removal, retrieval, and manual sync over JSON, and
//! runs the polling synchronizer in the background for the life of the
//! server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/resources` | List catalogued hashes |
//! | `POST`   | `/resources` | Persist one resource (see [`RawResourceRequest`]) |
//! | `DELETE` | `/resources/{hash}` | Remove a resource from the catalog |
//! | `POST`   | `/search` | Top-k retrieval |
//! | `POST`   | `/sync` | Run a sync pass now and return its report |
//! | `GET`    | `/stats` | Catalog and index counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `rejected` (422),
//! `backend_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use ragsync_core::error::SearchError;
use ragsync_core::search::SearchResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::PersistError;
use crate::raw_resource::{RawResource, RawResourceRequest};
use crate::stats::{collect_stats, Stats};
use crate::sync::SyncReport;

#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
    /// `k` for search requests that don't set one.
    default_k: usize,
}

/// Start the server and the background sync loop. Runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let coordinator = Arc::new(Coordinator::from_config(config).await?);
    let poller = coordinator.clone().spawn_polling(config.poll_interval());

    let app = router(coordinator, config.retrieval.k);

    println!("ragsync listening on http://{}", config.server.bind);
    tracing::info!(
        bind = %config.server.bind,
        poll_interval_secs = config.sync.poll_interval_secs,
        "server started"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    let served = axum::serve(listener, app).await;
    poller.abort();
    served?;

    Ok(())
}

/// Build the router. Exposed so tests and embedding binaries can serve it
/// on their own listener.
pub fn router(coordinator: Arc<Coordinator>, default_k: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/resources", get(handle_list).post(handle_persist))
        .route("/resources/{hash}", delete(handle_remove))
        .route("/search", post(handle_search))
        .route("/sync", post(handle_sync))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(AppState {
            coordinator,
            default_k,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"rejected"`).
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

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<PersistError> for AppError {
    fn from(err: PersistError) -> Self {
        if err.is_rejection() {
            app_error(StatusCode::UNPROCESSABLE_ENTITY, "rejected", err.to_string())
        } else {
            internal(err.to_string())
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::BackendUnavailable(_) => app_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "backend_unavailable",
                err.to_string(),
            ),
            SearchError::Index(_) => internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(format!("{:#}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        internal(err.to_string())
    }
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

// ============ /resources ============

#[derive(Serialize)]
struct ListResponse {
    hashes: Vec<String>,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ListResponse>, AppError> {
    let catalog = state.coordinator.persistence().catalog().clone();
    let snapshot = tokio::task::spawn_blocking(move || catalog.snapshot()).await??;
    Ok(Json(ListResponse {
        hashes: snapshot.hashes().into_iter().collect(),
    }))
}

#[derive(Serialize)]
struct PersistResponse {
    hash: String,
    content_path: String,
    metadata_path: Option<String>,
    already_present: bool,
}

/// `201 Created` for a new hash, `200 OK` when it was already catalogued.
async fn handle_persist(
    State(state): State<AppState>,
    Json(request): Json<RawResourceRequest>,
) -> Result<(StatusCode, Json<PersistResponse>), AppError> {
    let resource = RawResource::from_request(request)?;
    let persistence = state.coordinator.persistence().clone();
    let outcome = tokio::task::spawn_blocking(move || persistence.persist(&resource)).await??;

    let status = if outcome.already_present {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(PersistResponse {
            hash: outcome.hash,
            content_path: outcome.content_path,
            metadata_path: outcome.metadata_path,
            already_present: outcome.already_present,
        }),
    ))
}

#[derive(Serialize)]
struct RemoveResponse {
    hash: String,
    removed: bool,
}

async fn handle_remove(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<RemoveResponse>, AppError> {
    let persistence = state.coordinator.persistence().clone();
    let key = hash.clone();
    let removed = tokio::task::spawn_blocking(move || persistence.remove(&key)).await??;
    if !removed {
        return Err(not_found(format!("no resource with hash: {}", hash)));
    }
    Ok(Json(RemoveResponse { hash, removed }))
}

// ============ POST /search ============

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum SearchMode {
    Semantic,
    Hybrid,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    /// Overrides `[retrieval].hybrid` for this request.
    #[serde(default)]
    mode: Option<SearchMode>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = request.k.unwrap_or(state.default_k);
    if k == 0 {
        return Err(bad_request("k must be >= 1"));
    }
    let hybrid = request.mode.map(|m| m == SearchMode::Hybrid);
    let response = state.coordinator.search(&request.query, k, hybrid).await?;
    Ok(Json(response))
}

// ============ POST /sync, GET /stats ============

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    Ok(Json(state.coordinator.run_pass().await?))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(collect_stats(&state.coordinator).await?))
}
