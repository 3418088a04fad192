//! Handlers for the `/jobs` resource.
//!
//! Owner scoping is by the caller-supplied `owner_scope`; authentication
//! is left to the surrounding application.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use strand_core::error::CoreError;
use strand_core::job::JobStatus;
use strand_orchestrator::JobSubmission;

use crate::error::{AppError, AppResult};
use crate::query::ScopeParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a job. Returns 202 with `status: queued`, or 422 with
/// `status: error` when the submission failed validation (the rejected
/// job is still recorded and queryable).
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<JobSubmission>,
) -> AppResult<impl IntoResponse> {
    let ack = state.orchestrator.submit(input).await?;

    let status = if ack.status == JobStatus::Queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(DataResponse { data: ack })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// Jobs held in memory for the given owner scope, oldest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.orchestrator.list_jobs(params.scope()).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Status / result
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Always 200; unknown ids report `status: not_found`.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ScopeParams>,
) -> AppResult<impl IntoResponse> {
    let view = state.orchestrator.status(&job_id, params.scope()).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /api/v1/jobs/{id}/result
///
/// The completed artifact, or 404 when the job has none.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ScopeParams>,
) -> AppResult<impl IntoResponse> {
    let artifact = state
        .orchestrator
        .get_result(&job_id, params.scope())
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Result",
            id: job_id,
        }))?;
    Ok(Json(DataResponse { data: artifact }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Best-effort cancel; the returned status is the job's status after the
/// call (unchanged for terminal jobs).
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(params): Query<ScopeParams>,
) -> AppResult<impl IntoResponse> {
    let ack = state.orchestrator.cancel(&job_id, params.scope()).await?;
    Ok(Json(DataResponse { data: ack }))
}
