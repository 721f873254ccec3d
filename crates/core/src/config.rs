//! Environment-variable helpers shared by every config loader.
//!
//! Each binary builds its config structs once at startup from these and
//! passes them down explicitly.

use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `key` and parse it, falling back to `default` when unset.
pub fn env_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Read a required variable.
pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { key })
}

/// Read an optional variable, treating an empty value as unset.
pub fn env_optional(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma-separated variable into trimmed, non-empty items.
pub fn env_list(key: &'static str, default: &str) -> Vec<String> {
    split_list(&std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

pub fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
