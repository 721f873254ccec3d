pub mod blueprints;
pub mod health;
pub mod jobs;
pub mod ranges;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /blueprints     blueprint CRUD
/// /ranges         deploy, destroy, list, get
/// /jobs           job status
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/blueprints", blueprints::router())
        .nest("/ranges", ranges::router())
        .nest("/jobs", jobs::router())
}
