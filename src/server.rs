//! Webhook intake over HTTP.
//!
//! Handlers only classify and enqueue; all processing happens on the queue
//! worker, so a delivery is acknowledged as soon as it is queued.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhook` | Raw webhook delivery, event name in `X-GitHub-Event` |
//! | `POST` | `/jobs` | Pre-classified job envelope (`repositoryId`, `eventKind`, `payload`) |
//! | `GET`  | `/jobs/{ticket}` | Lifecycle state of an enqueued job |
//! | `GET`  | `/health` | Version and queue counters |
//!
//! # Responses
//!
//! - `202 Accepted` `{"status":"queued","ticket":n,"job_id":"..."}`
//! - `200 OK` `{"status":"ignored","event":"ping"}` for events not processed
//! - errors: `{"error":{"code":"bad_request","message":"..."}}`
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unavailable` (503).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use repo_mirror_core::event::{classify, ClassifyError, InboundJob, WebhookJob};

use crate::queue::{JobSink, JobState, JobTicket, QueueError, QueueStats};

const HEADER_EVENT: &str = "x-github-event";

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn JobSink>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/jobs", post(handle_job))
        .route("/jobs/{ticket}", get(handle_job_state))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c, then stop accepting requests and return.
pub async fn run_server(bind: &str, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {}", e);
            }
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

// ============ Errors ============

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("invalid job envelope: {0}")]
    Envelope(serde_json::Error),

    #[error("unknown ticket {0}")]
    UnknownTicket(JobTicket),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            ApiError::MissingHeader(_) | ApiError::Classify(_) | ApiError::Envelope(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            ApiError::UnknownTicket(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Queue(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============ POST /webhook, POST /jobs ============

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum IntakeResponse {
    Queued { ticket: JobTicket, job_id: String },
    Ignored { event: String },
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event = headers
        .get(HEADER_EVENT)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingHeader(HEADER_EVENT))?;

    match classify(event, &body) {
        Ok(Some(job)) => enqueue(&state, job).await,
        Ok(None) => {
            debug!(event, "event not processed, ignoring");
            let body = IntakeResponse::Ignored {
                event: event.to_string(),
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Err(e) => {
            warn!(event, "rejecting webhook: {}", e);
            Err(e.into())
        }
    }
}

async fn handle_job(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let inbound: InboundJob = serde_json::from_slice(&body).map_err(ApiError::Envelope)?;
    let job = WebhookJob::from_inbound(inbound)?;
    enqueue(&state, job).await
}

async fn enqueue(state: &AppState, job: WebhookJob) -> Result<Response, ApiError> {
    let job_id = job.id.to_string();
    let kind = job.event_kind();
    let ticket = state.queue.enqueue(job).await?;
    info!(%job_id, %kind, %ticket, "job queued");

    let body = IntakeResponse::Queued { ticket, job_id };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

// ============ GET /jobs/{ticket} ============

#[derive(Serialize)]
struct JobStateResponse {
    ticket: JobTicket,
    state: JobState,
}

async fn handle_job_state(
    State(state): State<AppState>,
    Path(ticket): Path<u64>,
) -> Result<Json<JobStateResponse>, ApiError> {
    let ticket = JobTicket(ticket);
    let job_state = state
        .queue
        .state(ticket)
        .ok_or(ApiError::UnknownTicket(ticket))?;
    Ok(Json(JobStateResponse {
        ticket,
        state: job_state,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    queue: QueueStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queue: state.queue.stats(),
    })
}
