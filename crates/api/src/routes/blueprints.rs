//! Route definitions for the `/blueprints` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::blueprints;
use crate::state::AppState;

/// Routes mounted at `/blueprints`.
///
/// ```text
/// GET    /        -> list_blueprints
/// POST   /        -> create_blueprint
/// GET    /{id}    -> get_blueprint
/// DELETE /{id}    -> delete_blueprint
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(blueprints::list_blueprints).post(blueprints::create_blueprint),
        )
        .route(
            "/{id}",
            get(blueprints::get_blueprint).delete(blueprints::delete_blueprint),
        )
}
