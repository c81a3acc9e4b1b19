//! Centralized error types for the ChannelCast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines a structured error type using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the ChannelCast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum ChannelError {
    /// Rejected input: bad cid, bad extension, bad bitrate literal, unknown codec.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation on an unknown cid, a removed file, or a missing thumbnail.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload would overwrite an existing file without permission.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A child process could not be started.
    #[error("Failed to launch process: {0}")]
    ProcessLaunch(String),

    /// A child process exited with a nonzero status while still active.
    #[error("Process exited abnormally: {0}")]
    ProcessRuntime(String),

    /// The prober timed out or failed to parse tool output.
    #[error("Probe failed: {0}")]
    Probe(String),

    /// The state file could not be read or written.
    #[error("State I/O failed: {0}")]
    StateIO(String),

    /// Internal server error that doesn't fit another category.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ProcessLaunch(_) => "process_launch_failed",
            Self::ProcessRuntime(_) => "process_runtime_error",
            Self::Probe(_) => "probe_error",
            Self::StateIO(_) => "state_io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ProcessLaunch(_) | Self::ProcessRuntime(_) | Self::Probe(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::StateIO(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode for ChannelError {
    fn code(&self) -> &'static str {
        ChannelError::code(self)
    }
}

/// Convenient Result alias for application-wide operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ChannelError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_returns_correct_code() {
        let err = ChannelError::Validation("bad cid".into());
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_error_returns_correct_code() {
        let err = ChannelError::Conflict("clip.ts exists".into());
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ChannelError::NotFound("cid 7".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn state_io_error_is_service_unavailable() {
        let err = ChannelError::StateIO("permission denied".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
