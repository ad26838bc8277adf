use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use classchat_core::error::CoreError;
use classchat_db::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`StoreError`] for storage
/// failures. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `classchat_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage error from either store backend.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            },

            // --- Storage errors ---
            AppError::Store(err) => classify_store_error(err),

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

/// Classify a storage error into an HTTP status, error code, and message.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Database(db) => classify_sqlx_error(db),
        StoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        StoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "Store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Storage is temporarily unavailable".to_string(),
            )
        }
        StoreError::InvalidRow(core) => {
            tracing::error!(error = %core, "Stored row failed to decode");
            internal()
        }
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_` or
///   `pk_`) map to 409.
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
                if constraint.starts_with("uq_") || constraint.starts_with("pk_") {
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
