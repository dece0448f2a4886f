//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Corrupt job state: {0}")]
    CorruptJobState(String),

    #[error("Renumbering is disabled; enable the strategy first")]
    PolicyDisabled,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<curator_engine::Error> for AppError {
    fn from(err: curator_engine::Error) -> Self {
        use curator_engine::Error;

        match err {
            Error::Validation(msg) => AppError::Validation(msg),
            Error::MalformedData(msg) => AppError::MalformedData(msg),
            Error::CorruptJobState(msg) => AppError::CorruptJobState(msg),
            Error::DuplicateId(id) => AppError::MalformedData(format!("duplicate record id: {id}")),
        }
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::MalformedData(msg) => (
                StatusCode::BAD_REQUEST,
                "Malformed data".to_string(),
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::PolicyDisabled => (StatusCode::CONFLICT, self.to_string(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::CorruptJobState(msg) => {
                tracing::error!("Corrupt job state: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Corrupt job state".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Io(e) => {
                tracing::error!("File error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "File error".to_string(),
                    Some(e.to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
