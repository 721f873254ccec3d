use std::time::Duration;

/// Whether a failed provisioning attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling and other conditions that clear on their own.
    Transient,
    Terminal,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProvisionError {
    pub class: ErrorClass,
    pub message: String,
}

/// Substrings in provider output that indicate API throttling.
/// Matched case-insensitively.
pub const THROTTLING_MARKERS: &[&str] = &[
    "rate limit",
    "throttling",
    "requestlimitexceeded",
    "toomanyrequests",
    "429",
];

/// Whether `output` carries one of the [`THROTTLING_MARKERS`].
pub fn is_throttled(output: &str) -> bool {
    let lower = output.to_lowercase();
    THROTTLING_MARKERS.iter().any(|m| lower.contains(m))
}

impl ProvisionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Terminal,
            message: message.into(),
        }
    }

    /// The invocation ran past its deadline and was killed.
    pub fn timeout(limit: Duration) -> Self {
        Self::terminal(format!(
            "provisioning timed out after {}s",
            limit.as_secs()
        ))
    }

    /// The provisioner could not be spawned or talked to.
    pub fn io(err: &std::io::Error) -> Self {
        Self::terminal(format!("failed to run provisioner: {err}"))
    }

    /// The provisioner ran but its reply did not follow the protocol.
    pub fn protocol(detail: impl std::fmt::Display) -> Self {
        Self::terminal(format!("invalid provisioner reply: {detail}"))
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}
