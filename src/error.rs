//! Error types for vidfetch
//!
//! This module provides the error handling for the library, including:
//! - The crate-wide [`Error`] type used by the registry, pool and API
//! - [`EngineError`], the classified failure a fetch engine reports
//! - [`TaskFailure`], the user-facing reason a task ended in the failed state
//! - HTTP status code mapping and structured error bodies for the API

use crate::types::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for vidfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vidfetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_tasks")
        key: Option<String>,
    },

    /// Client input was missing or malformed; no task was created
    #[error("{0}")]
    Validation(String),

    /// No task is registered under this id
    #[error("task {id} not found")]
    NotFound {
        /// The task id that was looked up
        id: TaskId,
    },

    /// A task with this id already exists in the registry
    #[error("task {id} already exists")]
    DuplicateId {
        /// The id that collided
        id: TaskId,
    },

    /// Requested file does not exist in the download directory
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Requested file name would escape the download directory
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a fetch engine.
///
/// Engines classify their own failures: `Fetch` is an expected, user-facing
/// retrieval problem (bad link, HTTP 403, unsupported site), `Other` is
/// anything the engine did not anticipate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Classified retrieval failure, carrying the engine's raw diagnostic
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Any other engine fault (spawn failure, local I/O, protocol surprise)
    #[error("engine error: {0}")]
    Other(String),
}

/// Reason a task ended in the failed state.
///
/// The `Display` output is exactly what clients see in the `error` field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskFailure {
    /// Classified fetch failure with an already sanitized message
    #[error("Download failed: {0}. Please check the link.")]
    Fetch(String),

    /// Unexpected fault during job execution
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// Job exited without reaching a terminal state
    #[error("The task was aborted unexpectedly.")]
    Aborted,
}

/// API error response format
///
/// Returned by the auxiliary endpoints (file serving, health) when an error
/// occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "file_not_found",
///     "message": "file not found: abc_Title.mp4"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,
            Error::InvalidFileName(_) => 400,

            // 404 Not Found
            Error::NotFound { .. } => 404,
            Error::FileNotFound(_) => 404,

            // 409 Conflict
            Error::DuplicateId { .. } => 409,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::NotFound { .. } => "task_not_found",
            Error::DuplicateId { .. } => "duplicate_id",
            Error::FileNotFound(_) => "file_not_found",
            Error::InvalidFileName(_) => "invalid_file_name",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::NotFound { id } | Error::DuplicateId { id } => Some(serde_json::json!({
                "task_id": id,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
