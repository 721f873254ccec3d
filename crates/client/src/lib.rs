//! Client library for the rangeforge API and the `rangectl` command.

pub mod api;
pub mod config;
pub mod error;
pub mod render;
pub mod tracker;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use tracker::{JobSource, JobTracker, TrackError};
