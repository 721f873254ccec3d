//! HTTP front end: blueprint management, job submission and job status.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;

use std::sync::Arc;

use rangeforge_db::{DbPool, Store};
use rangeforge_worker::WorkSignal;

use engine::{Dispatcher, StatusService};
use state::AppState;

/// Wire the engine services around `store`.
///
/// `signal` must be the one handed to the worker pool so that submissions
/// wake idle workers.
pub fn build_state(
    store: Arc<dyn Store>,
    db: Option<DbPool>,
    signal: WorkSignal,
) -> AppState {
    AppState {
        dispatcher: Arc::new(Dispatcher::new(Arc::clone(&store), signal)),
        status: Arc::new(StatusService::new(Arc::clone(&store))),
        store,
        db,
    }
}
