use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rangeforge_core::error::CoreError;
use rangeforge_db::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps domain and store errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses:
/// `{"error": msg, "code": CODE}`, plus `"violations"` for validation
/// failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `rangeforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A persistence error from the store.
    #[error(transparent)]
    Store(StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Domain errors raised inside the store surface as [`AppError::Core`].
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Core(core) => AppError::Core(core),
            other => AppError::Store(other),
        }
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Core(CoreError::Validation(errors)) = &self {
            let body = json!({
                "error": format!("Validation failed: {errors}"),
                "code": "VALIDATION_ERROR",
                "violations": errors,
            });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Store errors ---
            AppError::Store(StoreError::Database(err)) => classify_sqlx_error(err),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                internal()
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            errors.to_string(),
        ),
        CoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "CONFLICT", core.to_string()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
