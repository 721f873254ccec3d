//! Route definitions for the `/ranges` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::ranges;
use crate::state::AppState;

/// Routes mounted at `/ranges`.
///
/// ```text
/// GET    /         -> list_ranges
/// POST   /deploy   -> deploy_range     (202, job handle)
/// GET    /{id}     -> get_range
/// DELETE /{id}     -> destroy_range    (202, job handle)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(ranges::list_ranges))
        .route("/deploy", post(ranges::deploy_range))
        .route(
            "/{id}",
            get(ranges::get_range).delete(ranges::destroy_range),
        )
}
