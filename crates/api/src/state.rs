use std::sync::Arc;

use rangeforge_db::{DbPool, Store};

use crate::engine::{Dispatcher, StatusService};

/// Shared application state available to all handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for blueprints, ranges and jobs.
    pub store: Arc<dyn Store>,
    /// Job admission.
    pub dispatcher: Arc<Dispatcher>,
    /// Job lookups.
    pub status: Arc<StatusService>,
    /// Database pool when running against PostgreSQL; used by the health check.
    pub db: Option<DbPool>,
}
