// HTTP route handlers for the Testsmith API

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use testsmith_common::error::SubmitError;
use testsmith_common::store::RECENT_JOBS_LIMIT;
use testsmith_common::submit;
use testsmith_common::types::{Job, JobStatus, Run};

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Clone URL or absolute local path.
    pub repo_ref: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: i64,
    pub status: JobStatus,
}

/// Job record plus its recorded runs, as returned by the status endpoint.
#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub runs: Vec<Run>,
}

/// POST /jobs - Submit a repository for a test run
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    if payload.repo_ref.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "repo_ref must not be empty"
            })),
        )
            .into_response();
    }

    let submitted = submit::submit_job(
        state.store.as_ref(),
        state.queue.as_ref(),
        &payload.repo_ref,
        payload.language.as_deref(),
        state.max_queue_depth,
    )
    .await;

    match submitted {
        Ok(job) => {
            metrics::JOBS_SUBMITTED.inc();
            info!(
                job_id = job.id,
                repo_ref = %job.repo_ref,
                language = job.language.as_deref().unwrap_or("-"),
                "Job queued"
            );
            (
                StatusCode::CREATED,
                Json(SubmitResponse {
                    job_id: job.id,
                    status: job.status,
                }),
            )
                .into_response()
        }
        Err(SubmitError::QueueFull { depth, limit }) => {
            metrics::JOBS_REJECTED.inc();
            warn!(depth, limit, "Submission rejected, queue full");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": format!("work queue is full ({} waiting, limit {})", depth, limit)
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to submit job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to submit job: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /jobs/{id} - Full job record with its runs
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> impl IntoResponse {
    let job = match state.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "Job not found"
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(job_id, error = %e, "Failed to fetch job");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to fetch job: {}", e)
                })),
            )
                .into_response();
        }
    };

    match state.store.runs_for_job(job_id).await {
        Ok(runs) => (StatusCode::OK, Json(JobDetail { job, runs })).into_response(),
        Err(e) => {
            error!(job_id, error = %e, "Failed to fetch runs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to fetch runs: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /jobs - Most recently created jobs, newest first
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.recent_jobs(RECENT_JOBS_LIMIT).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list jobs");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to list jobs: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// POST /jobs/{id}/cancel - Flag a queued job for cancellation
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_job(job_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "Job not found"
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(job_id, error = %e, "Failed to fetch job");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to fetch job: {}", e)
                })),
            )
                .into_response();
        }
    }

    match state.store.request_cancel(job_id).await {
        Ok(()) => {
            info!(job_id, "Cancellation requested");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "message": "Cancellation requested; takes effect before execution starts"
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(job_id, error = %e, "Failed to flag cancellation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("Failed to flag cancellation: {}", e)
                })),
            )
                .into_response()
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
