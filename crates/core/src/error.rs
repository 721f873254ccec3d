use uuid::Uuid;

use crate::job::JobStatus;
use crate::validation::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A blueprint or resource tree violates one or more invariants.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A single malformed request field (bad region, empty name, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An active job or existing range already owns the target.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::Validation(errors)
    }
}
