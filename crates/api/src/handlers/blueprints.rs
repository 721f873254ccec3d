//! Handlers for the `/blueprints` resource.
//!
//! Blueprints are scoped to the [`Caller`]; another user's blueprint is
//! reported as not found.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rangeforge_core::blueprint::{Blueprint, CreateBlueprint};
use rangeforge_core::error::CoreError;
use rangeforge_core::types::BlueprintId;
use rangeforge_core::validation::validate_blueprint;

use crate::error::{AppError, AppResult};
use crate::middleware::caller::Caller;
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_owned(state: &AppState, id: BlueprintId, caller: &Caller) -> AppResult<Blueprint> {
    state
        .store
        .get_blueprint(id)
        .await?
        .filter(|bp| bp.owner == caller.as_str())
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Blueprint",
            id,
        }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/blueprints
///
/// Validate and store a blueprint. Returns 201 with the stored record, or
/// 400 listing every violation found.
pub async fn create_blueprint(
    caller: Caller,
    State(state): State<AppState>,
    Json(input): Json<CreateBlueprint>,
) -> AppResult<impl IntoResponse> {
    validate_blueprint(&input).map_err(CoreError::Validation)?;

    let blueprint = Blueprint::from_create(caller.as_str(), input);
    state.store.insert_blueprint(&blueprint).await?;

    tracing::info!(
        blueprint_id = %blueprint.id,
        owner = %blueprint.owner,
        hosts = blueprint.host_count(),
        "Blueprint created",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: blueprint })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/blueprints
pub async fn list_blueprints(
    caller: Caller,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let blueprints = state.store.list_blueprints(caller.as_str()).await?;
    Ok(Json(DataResponse { data: blueprints }))
}

/// GET /api/v1/blueprints/{id}
pub async fn get_blueprint(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<BlueprintId>,
) -> AppResult<impl IntoResponse> {
    let blueprint = find_owned(&state, id, &caller).await?;
    Ok(Json(DataResponse { data: blueprint }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/blueprints/{id}
///
/// Ranges already deployed from the blueprint are unaffected; queued
/// deploys of it will fail when executed.
pub async fn delete_blueprint(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<BlueprintId>,
) -> AppResult<StatusCode> {
    find_owned(&state, id, &caller).await?;

    if !state.store.delete_blueprint(id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Blueprint",
            id,
        }));
    }

    tracing::info!(blueprint_id = %id, owner = %caller.as_str(), "Blueprint deleted");
    Ok(StatusCode::NO_CONTENT)
}
