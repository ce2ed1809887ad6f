//! HTTP API.
//!
//! Thin axum handlers over the enqueue guard, the tweet ingester, and the
//! execution store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/ping/v1` | Liveness check (returns version) |
//! | `POST` | `/migrations/run/v1` | Apply schema migrations |
//! | `POST` | `/criteria/{id}/enqueue/v1?forced=bool` | Dispatch a criteria to the scraper |
//! | `POST` | `/criteria/{id}/executions/v1` | Record a `PENDING` execution |
//! | `PUT`  | `/executions/{id}/status/v1` | Move an execution to a new status |
//! | `POST` | `/tweets/v1` | Ingest a batch of tweets |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "already_enqueued", "message": "an execution of this criteria is already enqueued" } }
//! ```
//!
//! `already_enqueued` (409), `not_found` (404), `bad_request` (400),
//! `timeout` (408); every storage or dispatch fault is a 500 carrying the
//! sentinel's name as code.
//!
//! Each handler runs under the configured request deadline. When it fires
//! the handler future is dropped, which cancels any in-flight store or
//! scraper call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tweet_harness_core::enqueue::EnqueueGuard;
use tweet_harness_core::gateway::ScraperGateway;
use tweet_harness_core::ingest::{IngestSummary, TweetIngester};
use tweet_harness_core::models::{ExecutionStatus, TweetCandidate};
use tweet_harness_core::store::ExecutionStore;
use tweet_harness_core::Error;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::scraper::HttpScraperGateway;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<SqliteStore>,
    guard: Arc<EnqueueGuard>,
    ingester: Arc<TweetIngester>,
    request_timeout: Duration,
}

impl AppState {
    /// Wire the core components to one store and one gateway.
    pub fn new(
        store: Arc<SqliteStore>,
        gateway: Arc<dyn ScraperGateway>,
        request_timeout: Duration,
    ) -> Self {
        let guard = EnqueueGuard::new(store.clone(), store.clone(), gateway);
        let ingester = TweetIngester::new(store.clone(), store.clone());
        Self {
            store,
            guard: Arc::new(guard),
            ingester: Arc::new(ingester),
            request_timeout,
        }
    }

    pub fn guard(&self) -> &EnqueueGuard {
        &self.guard
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping/v1", get(handle_ping))
        .route("/migrations/run/v1", post(handle_run_migrations))
        .route("/criteria/{id}/enqueue/v1", post(handle_enqueue))
        .route("/criteria/{id}/executions/v1", post(handle_create_execution))
        .route("/executions/{id}/status/v1", put(handle_update_execution_status))
        .route("/tweets/v1", post(handle_ingest_tweets))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Opens the database, re-dispatches criteria whose executions were still
/// active (a failure there is logged and does not prevent startup), then
/// serves until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let gateway = Arc::new(HttpScraperGateway::new(&config.scraper)?);
    let state = AppState::new(store, gateway, config.server.request_timeout());

    if let Err(e) = state.guard().resume().await {
        tracing::error!(error = %e, "failed to resume active executions");
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("server is ready to receive requests on {}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
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

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
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

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::AlreadyEnqueued => StatusCode::CONFLICT,
            Error::ExecutionNotFound => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn timeout_error(timeout: Duration) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: format!("request did not complete within {:?}", timeout),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Run `fut` under the request deadline.
async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| timeout_error(timeout))?
}

// ============ GET /ping/v1 ============

#[derive(Serialize)]
struct PingResponse {
    status: String,
    version: String,
}

async fn handle_ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /migrations/run/v1 ============

async fn handle_run_migrations(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    with_deadline(state.request_timeout, async {
        migrate::apply(state.store.pool()).await.map_err(|e| {
            tracing::error!(error = %e, "migrations failed");
            internal("failed to run migrations")
        })?;
        Ok::<_, AppError>(StatusCode::NO_CONTENT)
    })
    .await
}

// ============ POST /criteria/{id}/enqueue/v1 ============

#[derive(Deserialize)]
struct EnqueueParams {
    #[serde(default)]
    forced: bool,
}

async fn handle_enqueue(
    State(state): State<AppState>,
    criteria_id: Result<Path<i64>, PathRejection>,
    params: Result<Query<EnqueueParams>, QueryRejection>,
) -> Result<StatusCode, AppError> {
    let Path(criteria_id) = criteria_id?;
    let Query(params) = params?;
    with_deadline(state.request_timeout, async {
        state.guard.enqueue(criteria_id, params.forced).await?;
        Ok::<_, AppError>(StatusCode::NO_CONTENT)
    })
    .await
}

// ============ Executions ============

#[derive(Serialize)]
struct CreatedResponse {
    id: i64,
}

async fn handle_create_execution(
    State(state): State<AppState>,
    criteria_id: Result<Path<i64>, PathRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let Path(criteria_id) = criteria_id?;
    with_deadline(state.request_timeout, async {
        let id = state.store.insert_execution(criteria_id).await?;
        Ok::<_, AppError>((StatusCode::CREATED, Json(CreatedResponse { id })))
    })
    .await
}

#[derive(Deserialize)]
struct StatusBody {
    status: ExecutionStatus,
}

async fn handle_update_execution_status(
    State(state): State<AppState>,
    execution_id: Result<Path<i64>, PathRejection>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Path(execution_id) = execution_id?;
    let Json(body) = body?;
    with_deadline(state.request_timeout, async {
        state
            .store
            .update_execution_status(execution_id, body.status)
            .await?;
        Ok::<_, AppError>(StatusCode::NO_CONTENT)
    })
    .await
}

// ============ POST /tweets/v1 ============

async fn handle_ingest_tweets(
    State(state): State<AppState>,
    body: Result<Json<Vec<TweetCandidate>>, JsonRejection>,
) -> Result<Json<IngestSummary>, AppError> {
    let Json(candidates) = body?;
    with_deadline(state.request_timeout, async {
        let summary = state.ingester.ingest(&candidates).await?;
        Ok::<_, AppError>(Json(summary))
    })
    .await
}
