//! Operator HTTP surface: health, metrics and job status

use crate::engine::{Engine, EngineHealth};
use crate::models::{Job, LogEntry, RecordCounts};
use crate::observability::MetricsSnapshot;
use crate::store::StoreError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid job id: {0}")]
    InvalidId(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidId(_) => "INVALID_ID",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = json!({"code": self.code(), "message": self.to_string()});
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::JobNotFound(id) => ApiError::NotFound(format!("job {}", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub engine: EngineHealth,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    pub records: RecordCounts,
    pub logs: Vec<LogEntry>,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .with_state(engine)
}

pub async fn run(engine: Arc<Engine>, address: SocketAddr) -> Result<(), AnyError> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "mintbridge server listening");

    axum::serve(listener, router(engine).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// 503 when either chain has no usable endpoint
async fn health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let health = engine.health().await;
    let available = health.is_available();

    let response = HealthResponse {
        status: if available { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        engine: health,
        metrics: engine.metrics(),
    };
    let status = if available {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn list_jobs(State(engine): State<Arc<Engine>>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(engine.store().list_jobs().await?))
}

async fn get_job(
    State(engine): State<Arc<Engine>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id = Uuid::parse_str(&job_id).map_err(|_| ApiError::InvalidId(job_id.clone()))?;
    let store = engine.store();
    let job = store
        .get_job(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))?;
    let records = store.list_records(id).await?;
    let logs = store.list_logs(id).await?;

    Ok(Json(JobResponse {
        job,
        records: RecordCounts::tally(records.iter()),
        logs,
    }))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
