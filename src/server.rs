//! HTTP API for health, statistics, recent transactions, and manual
//! triggering.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, uptime, cursor, run stats |
//! | `GET`  | `/ping` | Liveness probe, returns `pong` |
//! | `GET`  | `/stats` | Run stats plus store counts |
//! | `GET`  | `/transactions/recent?limit=N` | Newest stored transactions (default 10, max 100) |
//! | `POST` | `/trigger` | Run one ingestion cycle now |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "already_processing", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `already_processing` (429), `processing_failed` (500), `internal` (500).

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use txmail_core::models::{Cursor, TransactionRecord};

use crate::ingest::{CycleError, CycleReport, Orchestrator, RunStats};
use crate::stats::{store_summary, StoreSummary};

const DEFAULT_RECENT_LIMIT: i64 = 10;
const MAX_RECENT_LIMIT: i64 = 100;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    started_at: Instant,
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState {
        orchestrator,
        started_at: Instant::now(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ping", get(handle_ping))
        .route("/stats", get(handle_stats))
        .route("/transactions/recent", get(handle_recent))
        .route("/trigger", post(handle_trigger))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "HTTP server listening");
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

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        err.to_string(),
    )
}

// ============ GET /health, /ping ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    uptime_secs: u64,
    processing: bool,
    cursor: Option<Cursor>,
    stats: RunStats,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let cursor = state.orchestrator.cursor().await.map_err(internal)?;
    Ok(Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        processing: state.orchestrator.is_processing(),
        cursor,
        stats: state.orchestrator.stats().await,
    }))
}

async fn handle_ping() -> &'static str {
    "pong"
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    run: RunStats,
    store: StoreSummary,
    processing: bool,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let store = store_summary(state.orchestrator.ledger())
        .await
        .map_err(internal)?;
    Ok(Json(StatsResponse {
        run: state.orchestrator.stats().await,
        store,
        processing: state.orchestrator.is_processing(),
    }))
}

// ============ GET /transactions/recent ============

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct RecentResponse {
    count: usize,
    transactions: Vec<TransactionRecord>,
}

async fn handle_recent(
    State(state): State<AppState>,
    query: Result<Query<RecentParams>, QueryRejection>,
) -> Result<Json<RecentResponse>, AppError> {
    let Query(params) = query
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "bad_request", e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    if limit < 1 {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "limit must be >= 1",
        ));
    }

    let transactions = state
        .orchestrator
        .ledger()
        .recent(limit.min(MAX_RECENT_LIMIT))
        .await
        .map_err(internal)?;
    Ok(Json(RecentResponse {
        count: transactions.len(),
        transactions,
    }))
}

// ============ POST /trigger ============

#[derive(Serialize)]
struct TriggerResponse {
    status: &'static str,
    report: CycleReport,
    stats: RunStats,
}

/// The cycle runs on its own task so a client that disconnects mid-cycle
/// cannot cancel it.
async fn handle_trigger(State(state): State<AppState>) -> Result<Json<TriggerResponse>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let cycle = tokio::spawn(async move { orchestrator.run_ingestion_cycle().await });

    let result = cycle.await.map_err(|e| {
        tracing::error!(error = %e, "ingestion cycle task failed");
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing_failed",
            format!("ingestion cycle task failed: {}", e),
        )
    })?;

    match result {
        Ok(report) => Ok(Json(TriggerResponse {
            status: "completed",
            report,
            stats: state.orchestrator.stats().await,
        })),
        Err(e @ CycleError::AlreadyProcessing) => Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "already_processing",
            e.to_string(),
        )),
        Err(e @ CycleError::Aborted(_)) => Err(AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing_failed",
            e.to_string(),
        )),
    }
}

async fn handle_not_found() -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", "no such route")
}
