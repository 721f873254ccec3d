use rangeforge_core::error::CoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain-level outcome: not found, conflict, invalid transition.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into the domain model.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            StoreError::Core(e) => Some(e),
            _ => None,
        }
    }
}
