//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps pipeline errors from `ota-dist` to HTTP status codes and returns
//! JSON bodies `{"error": {"code", "message"}}`. Internal error details are
//! logged, never returned.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ota_dist::DistError;

/// Structured JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "PUBLISH_IN_PROGRESS").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`].
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// The uploaded bundle is corrupt, unsafe, or empty (422).
    #[error("invalid bundle: {0}")]
    InvalidArchive(String),

    /// Missing or unknown credential (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Another publish for the same application holds the lock (409).
    #[error("publish in progress: {0}")]
    Busy(String),

    /// Conflict with existing state, such as an immutable version (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the configured body limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::InvalidArchive(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ARCHIVE"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Busy(_) => (StatusCode::CONFLICT, "PUBLISH_IN_PROGRESS"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The body clients get for this error. Internal details are replaced.
    pub fn detail(&self) -> ErrorDetail {
        let (_, code) = self.status_and_code();
        let message = match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        ErrorDetail {
            code: code.to_string(),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }
        let body = ErrorBody {
            error: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<&DistError> for AppError {
    fn from(err: &DistError) -> Self {
        match err {
            DistError::Validation(msg) => Self::Validation(msg.clone()),
            DistError::Archive(e) => Self::InvalidArchive(e.to_string()),
            DistError::Busy { .. } => Self::Busy(err.to_string()),
            DistError::VersionConflict { .. } => Self::Conflict(err.to_string()),
            DistError::Manifest { .. }
            | DistError::Io { .. }
            | DistError::PointerStore(_)
            | DistError::RollbackFailed { .. }
            | DistError::TaskAborted(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DistError> for AppError {
    fn from(err: DistError) -> Self {
        Self::from(&err)
    }
}

impl From<ota_core::ValidationError> for AppError {
    fn from(err: ota_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::Validation(format!("malformed multipart body: {}", err.body_text()))
        }
    }
}
