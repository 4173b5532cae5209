use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// No record for the given identifier.
    #[error("Book not found: {0}")]
    NotFound(String),

    /// Missing or malformed request fields.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Store unreachable or query failure.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable machine-readable kind, sent as the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Storage(_) => "storage_error",
            AppError::Io(_) => "io_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to callers. Driver and filesystem details stay in the log.
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound(_) | AppError::Validation(_) => self.to_string(),
            AppError::Storage(_) => "The book store could not complete the request".to_string(),
            AppError::Io(_) => "The upload directory could not complete the request".to_string(),
            AppError::Config(_) => "Server is misconfigured".to_string(),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
