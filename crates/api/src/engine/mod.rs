//! In-process job engine: admission and status lookups over the shared
//! store. Execution lives in `rangeforge-worker`.

pub mod dispatcher;
pub mod status;

pub use dispatcher::Dispatcher;
pub use status::StatusService;
