use std::time::Duration;

use rangeforge_core::config::{env_optional, env_or, ConfigError};

/// Default server address.
pub const DEFAULT_URL: &str = "http://localhost:3000";

/// Seconds between job status polls.
pub const DEFAULT_POLL_SECS: u64 = 3;

/// Seconds to wait for a job before giving up locally.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// Client settings. Command-line flags override the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API server, without a trailing slash.
    pub base_url: String,
    /// Sent as `x-user`; `None` lets the server default to `anonymous`.
    pub user: Option<String>,
    pub poll_interval: Duration,
    /// Default `--timeout` for `--wait`.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            user: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load from environment variables, falling back to the defaults.
    ///
    /// | Env var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `RANGEFORGE_URL`          | `http://localhost:3000` |
    /// | `RANGEFORGE_USER`         | unset                   |
    /// | `RANGEFORGE_POLL_SECS`    | `3`                     |
    /// | `RANGEFORGE_TIMEOUT_SECS` | `1800`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_secs: u64 = env_or("RANGEFORGE_POLL_SECS", DEFAULT_POLL_SECS)?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RANGEFORGE_POLL_SECS",
                value: poll_secs.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            base_url: env_or("RANGEFORGE_URL", DEFAULT_URL.to_string())?,
            user: env_optional("RANGEFORGE_USER"),
            poll_interval: Duration::from_secs(poll_secs),
            timeout: Duration::from_secs(env_or("RANGEFORGE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
        }
        .normalized())
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, url: Option<String>, user: Option<String>) -> Self {
        if let Some(url) = url {
            self.base_url = url;
        }
        if user.is_some() {
            self.user = user;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        self
    }
}
