use rangeforge_core::config::{env_list, env_optional, env_or, ConfigError};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// PostgreSQL URL. Without one the server keeps state in memory.
    pub database_url: Option<String>,
    /// Run a worker pool inside the API process (default: `true`).
    pub embedded_workers: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`         | unset (in-memory store)    |
    /// | `EMBEDDED_WORKERS`     | `true`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0".to_string())?,
            port: env_or("PORT", 3000)?,
            cors_origins: env_list("CORS_ORIGINS", "http://localhost:5173"),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            database_url: env_optional("DATABASE_URL"),
            embedded_workers: env_or("EMBEDDED_WORKERS", true)?,
        })
    }
}
