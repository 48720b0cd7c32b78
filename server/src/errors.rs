// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures of the task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Input rejected before any backend call.
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    NotAuthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("invalid action '{0}'")]
    InvalidAction(String),
    #[error("evidence upload failed: {0}")]
    Upload(#[from] UploadError),
    /// The atomic instance creation reported success but nothing is there.
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }
}

/// Why an evidence upload did not complete. Every variant is fatal to the
/// submission attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("storage permission denied: {0}")]
    Permission(String),
    #[error("storage bucket is not configured: {0}")]
    Bucket(String),
    #[error("upload cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => UploadError::Permission(err.to_string()),
            _ => UploadError::Other(err.to_string()),
        }
    }
}

// --- HTTP error mapping ---

/// Our custom error type for the HTTP layer.
#[derive(Debug)]
pub struct AppError {
    pub(crate) code: StatusCode,
    pub(crate) message: String,
}

impl AppError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Allows converting an `anyhow::Error` (coming from `database`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        let code = match &err {
            TaskError::Validation(_) | TaskError::InvalidAction(_) => StatusCode::BAD_REQUEST,
            TaskError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            TaskError::Forbidden(_) => StatusCode::FORBIDDEN,
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::Upload(UploadError::Cancelled) => StatusCode::BAD_REQUEST,
            TaskError::Upload(_) => StatusCode::BAD_GATEWAY,
            TaskError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TaskError::Backend(inner) => {
                tracing::error!("Internal server error: {:?}", inner);
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.",
                );
            }
        };
        Self::new(code, &err.to_string())
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
