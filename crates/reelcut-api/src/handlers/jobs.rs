//! Job submission, status and cancellation handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use reelcut_models::{ClipRequest, InputRef, JobId, JobStatus, StatusReport};
use reelcut_worker::CancelOutcome;

use crate::error::ApiResult;
use crate::state::AppState;

/// Body for registering a file the upload collaborator already stored.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub mime_type: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub state: JobStatus,
}

/// Response for a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub state: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Only return jobs in this state
    #[serde(default)]
    pub state: Option<JobStatus>,
}

/// Validate an uploaded file and return the input reference to submit with.
pub async fn register_upload(
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> ApiResult<Json<InputRef>> {
    let input = state
        .dispatcher
        .accept_upload(&body.path, &body.mime_type, body.size_bytes)
        .await?;
    Ok(Json(input))
}

/// Submit a clip request.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<ClipRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let kind = request.kind;
    let job_id = state.dispatcher.submit(request).await?;
    info!(job_id = %job_id, kind = kind.as_str(), "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            state: JobStatus::Queued,
        }),
    ))
}

/// List jobs, oldest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Json<Vec<StatusReport>> {
    let reports = state
        .dispatcher
        .list()
        .iter()
        .filter(|job| query.state.map_or(true, |s| job.status == s))
        .map(StatusReport::from)
        .collect();
    Json(reports)
}

/// Current status of one job.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<StatusReport>> {
    let report = state.dispatcher.report(&JobId::from_string(job_id))?;
    Ok(Json(report))
}

/// Request cancellation. Queued jobs are canceled immediately; running jobs
/// move to `canceling` and settle once the tool stops.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job_id = JobId::from_string(job_id);
    let outcome = state.dispatcher.cancel(&job_id)?;

    let (code, job_state) = match outcome {
        CancelOutcome::Canceled => (StatusCode::OK, JobStatus::Canceled),
        CancelOutcome::Canceling => (StatusCode::ACCEPTED, JobStatus::Canceling),
    };
    Ok((
        code,
        Json(CancelResponse {
            job_id,
            state: job_state,
        }),
    ))
}

/// Acknowledge a terminal job and drop its record.
pub async fn ack_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<StatusReport>> {
    let job = state.dispatcher.acknowledge(&JobId::from_string(job_id))?;
    Ok(Json(StatusReport::from(&job)))
}
