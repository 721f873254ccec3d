use rangeforge_core::validation::Violation;

/// Errors talking to the API server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (connect, TLS, body decode, ...).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with an error envelope.
    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
        /// Populated for `VALIDATION_ERROR` responses.
        violations: Vec<Violation>,
    },
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Request(e) => e.is_connect() || e.is_timeout(),
            ClientError::Api { status, .. } => *status >= 500 || *status == 408,
        }
    }
}
