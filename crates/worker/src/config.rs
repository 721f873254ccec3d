use std::time::Duration;

use rangeforge_core::config::{env_or, ConfigError};

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs executed concurrently.
    pub concurrency: usize,
    /// Idle re-check interval when no wake-up arrives.
    pub poll_interval: Duration,
    /// Total provisioning attempts per job, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
    /// Upper bound on a single provisioner call.
    pub provision_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(2000),
            provision_timeout: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    /// Load from environment variables, falling back to the defaults.
    ///
    /// | Env var                      | Default |
    /// |------------------------------|---------|
    /// | `WORKER_CONCURRENCY`         | `4`     |
    /// | `WORKER_POLL_INTERVAL_MS`    | `1000`  |
    /// | `PROVISION_MAX_ATTEMPTS`     | `3`     |
    /// | `PROVISION_RETRY_BACKOFF_MS` | `2000`  |
    /// | `PROVISION_TIMEOUT_SECS`     | `3600`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency: usize = env_or("WORKER_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                value: concurrency.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        let max_attempts: u32 = env_or("PROVISION_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "PROVISION_MAX_ATTEMPTS",
                value: max_attempts.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            concurrency,
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 1000)?),
            max_attempts,
            retry_backoff: Duration::from_millis(env_or("PROVISION_RETRY_BACKOFF_MS", 2000)?),
            provision_timeout: Duration::from_secs(env_or("PROVISION_TIMEOUT_SECS", 3600)?),
        })
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1 << exponent)
    }
}
