//! Job execution: claims queued jobs, drives the provisioner, and records
//! the outcome.

pub mod config;
pub mod executor;
pub mod pool;
pub mod shutdown;
pub mod signal;

pub use config::WorkerConfig;
pub use executor::JobExecutor;
pub use pool::{PoolHandle, WorkerPool};
pub use signal::WorkSignal;
