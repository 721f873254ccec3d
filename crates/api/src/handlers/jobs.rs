//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rangeforge_core::job::{JobListQuery, JobLookup};
use rangeforge_core::types::JobId;

use crate::error::AppResult;
use crate::middleware::caller::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs
///
/// The caller's jobs, newest first. Supports optional `status`, `limit`
/// (default 50, max 100) and `offset` query parameters.
pub async fn list_jobs(
    caller: Caller,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.status.list_jobs(caller.as_str(), &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
///
/// 200 with the job, or 404 with `{"data": {"id", "status": "not_found"}}`
/// so pollers can treat a missing job as a status like any other.
pub async fn get_job(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let lookup = state.status.get_job(caller.as_str(), id).await?;
    let status = match lookup {
        JobLookup::Found(_) => StatusCode::OK,
        JobLookup::NotFound(_) => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(DataResponse { data: lookup })))
}
