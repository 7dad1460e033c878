//! Job API handlers.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use pressroom_core::{CancelOutcome, Job, JobError, JobId, SubmitRequest};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Error body returned by every failing job endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub outcome: CancelOutcome,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps a coordinator error onto an HTTP status and error body.
pub fn job_error(err: JobError) -> ApiError {
    let (status, kind) = match &err {
        JobError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        JobError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        JobError::ResultNotReady { .. } => (StatusCode::CONFLICT, "not_ready"),
        JobError::ResultGone(_) => (StatusCode::GONE, "gone"),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.kind().as_str()),
    };
    (status, Json(ErrorResponse::new(err.to_string(), kind)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new job.
///
/// POST /api/v1/jobs
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(rejection.body_text(), "validation")),
        )
    })?;

    let coordinator = state.coordinator();
    let id = coordinator.submit_request(&request).await.map_err(job_error)?;
    let job = coordinator.status(&id).await.map_err(job_error)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// List all jobs, newest first.
///
/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<JobListResponse> {
    let jobs = state.coordinator().list().await;
    let total = jobs.len();
    Json(JobListResponse { jobs, total })
}

/// Get a job snapshot.
///
/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .coordinator()
        .status(&JobId::from(id))
        .await
        .map_err(job_error)?;
    Ok(Json(job))
}

/// Ask a job to stop.
///
/// POST /api/v1/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job_id = JobId::from(id);
    let outcome = state
        .coordinator()
        .cancel(&job_id)
        .await
        .map_err(job_error)?;
    Ok(Json(CancelResponse { job_id, outcome }))
}

/// Forget a job and remove its files.
///
/// DELETE /api/v1/jobs/{id}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator()
        .discard(&JobId::from(id))
        .await
        .map_err(job_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Download a completed job's output.
///
/// GET /api/v1/jobs/{id}/result
pub async fn download_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = JobId::from(id);
    let download = state
        .coordinator()
        .open_result(&job_id)
        .await
        .map_err(job_error)?;

    let filename = download.filename.clone();
    let size = download.size;
    let stream = download.into_stream().await.map_err(|e| {
        error!(job_id = %job_id, error = %e, "Failed to open result");
        job_error(JobError::ResultGone(job_id.clone()))
    })?;

    info!(job_id = %job_id, filename = %filename, size, "Serving result");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .body(Body::from_stream(stream))
        .map_err(|e| {
            error!(job_id = %job_id, error = %e, "Failed to build download response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "internal")),
            )
        })
}

/// `attachment` header with an ASCII fallback and the RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}
