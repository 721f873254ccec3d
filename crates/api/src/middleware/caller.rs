//! Caller identity extractor.
//!
//! Identity is asserted by the `x-user` header; authenticating that
//! assertion is left to whatever sits in front of the API.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Header naming the calling user.
pub const CALLER_HEADER: &str = "x-user";

/// Owner assumed when no `x-user` header is sent.
pub const ANONYMOUS: &str = "anonymous";

const MAX_CALLER_LEN: usize = 64;

/// The user a request acts on behalf of. Every blueprint, range and job is
/// scoped to it.
///
/// ```ignore
/// async fn list(caller: Caller, State(state): State<AppState>) -> AppResult<...> {
///     state.store.list_ranges(&caller.0).await?;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(CALLER_HEADER) else {
            return Ok(Caller(ANONYMOUS.to_string()));
        };

        let value = raw
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("{CALLER_HEADER} header must be ASCII")))?
            .trim();

        if value.is_empty() {
            return Ok(Caller(ANONYMOUS.to_string()));
        }
        if value.len() > MAX_CALLER_LEN {
            return Err(AppError::BadRequest(format!(
                "{CALLER_HEADER} must be at most {MAX_CALLER_LEN} characters"
            )));
        }
        if value.contains('/') || value.chars().any(char::is_control) {
            return Err(AppError::BadRequest(format!(
                "{CALLER_HEADER} contains an invalid character"
            )));
        }

        Ok(Caller(value.to_string()))
    }
}
