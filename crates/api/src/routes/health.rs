use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// `memory` or `postgres`.
    pub store: &'static str,
    /// Whether the database is reachable; absent for the in-memory store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_healthy: Option<bool>,
}

/// GET /health -- returns service and database health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (store, db_healthy) = match &state.db {
        Some(pool) => ("postgres", Some(rangeforge_db::health_check(pool).await.is_ok())),
        None => ("memory", None),
    };

    let status = if db_healthy == Some(false) { "degraded" } else { "ok" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store,
        db_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
