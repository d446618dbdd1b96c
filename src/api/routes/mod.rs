//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - `tasks`: task submission, status polling and file download
//! - `system`: health, events, OpenAPI

use crate::types::{Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` works
pub use system::*;
pub use tasks::*;

/// Error text for status queries on unknown ids
pub const UNKNOWN_TASK_MESSAGE: &str = "No such task was found.";

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /start_download
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StartDownloadRequest {
    /// URL of the media resource to fetch
    pub url: String,
}

/// Response for POST /start_download
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StartDownloadResponse {
    /// Whether a task was created
    pub success: bool,
    /// Id of the created task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Why no task was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartDownloadResponse {
    /// A task was created
    pub fn accepted(task_id: TaskId) -> Self {
        Self {
            success: true,
            task_id: Some(task_id),
            error: None,
        }
    }

    /// The request was refused
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            task_id: None,
            error: Some(error.into()),
        }
    }
}

/// Response for GET /check_status/:task_id
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    /// Task is queued or running
    Processing {
        /// Progress percentage (0-99)
        progress: u8,
        /// Latest status message
        message: String,
    },
    /// Task finished with a file ready to download
    Completed {
        /// Title of the fetched resource
        title: String,
        /// Relative link to the produced file
        download_url: String,
        /// Public file name
        filename: String,
    },
    /// Task finished with an error
    Failed {
        /// User-facing error text
        error: String,
    },
    /// No task has this id
    Unknown {
        /// User-facing error text
        error: String,
    },
}

impl StatusResponse {
    /// Response for an unknown task id
    pub fn unknown() -> Self {
        StatusResponse::Unknown {
            error: UNKNOWN_TASK_MESSAGE.to_string(),
        }
    }
}

impl From<Task> for StatusResponse {
    fn from(task: Task) -> Self {
        match (task.status, task.result, task.error) {
            (TaskStatus::Completed, Some(result), _) => StatusResponse::Completed {
                download_url: download_url(&result.file_name),
                title: result.title,
                filename: result.file_name,
            },
            (TaskStatus::Failed, _, error) => StatusResponse::Failed {
                error: error.unwrap_or_default(),
            },
            _ => StatusResponse::Processing {
                progress: task.progress,
                message: task.message,
            },
        }
    }
}

/// Relative download link for a produced file
pub fn download_url(file_name: &str) -> String {
    format!("/downloads/{}", urlencoding::encode(file_name))
}
