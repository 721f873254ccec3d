//! Handlers for the `/ranges` resource.
//!
//! Deploy and destroy only queue a job and answer 202 with its handle;
//! progress is followed through `/jobs/{id}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rangeforge_core::error::CoreError;
use rangeforge_core::job::DeployRequest;
use rangeforge_core::types::RangeId;

use crate::error::{AppError, AppResult};
use crate::middleware::caller::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// POST /api/v1/ranges/deploy
///
/// Returns 202 with `{job_id, status}`. 404 when the blueprint is unknown,
/// 409 when the range name is taken or already being deployed, 400 for a
/// bad name or region.
pub async fn deploy_range(
    caller: Caller,
    State(state): State<AppState>,
    Json(input): Json<DeployRequest>,
) -> AppResult<impl IntoResponse> {
    let handle = state.dispatcher.submit_deploy(caller.as_str(), input).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: handle })))
}

/// DELETE /api/v1/ranges/{id}
///
/// Queues teardown. Returns 202 with the job handle; 409 while another job
/// owns the range.
pub async fn destroy_range(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<RangeId>,
) -> AppResult<impl IntoResponse> {
    let handle = state.dispatcher.submit_destroy(caller.as_str(), id).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: handle })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/ranges
pub async fn list_ranges(
    caller: Caller,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let ranges = state.store.list_ranges(caller.as_str()).await?;
    Ok(Json(DataResponse { data: ranges }))
}

/// GET /api/v1/ranges/{id}
pub async fn get_range(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<RangeId>,
) -> AppResult<impl IntoResponse> {
    let range = state
        .store
        .get_range(id)
        .await?
        .filter(|r| r.owner == caller.as_str())
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Range", id }))?;
    Ok(Json(DataResponse { data: range }))
}
