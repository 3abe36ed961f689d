//! Error types for the authority HTTP API.
//!
//! [`ApiError`] converts into an axum response with a small JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use outpost_db::DbError;

/// Authority API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // =========================================================================
    // Client Errors
    // =========================================================================
    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    // =========================================================================
    // Server Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Database(e) if e.is_transient() => {
                error!(error = %e, "Database busy");
                (StatusCode::SERVICE_UNAVAILABLE, "database busy".to_string())
            }
            ApiError::Database(e) => {
                error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
