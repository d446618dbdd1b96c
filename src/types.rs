//! Core types for vidfetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Progress ceiling while a task is still processing; 100 is reserved for completion
pub const MAX_PROCESSING_PROGRESS: u8 = 99;

/// Status message a task is seeded with at creation
pub const INITIAL_MESSAGE: &str = "Starting task...";

/// Status message set on the completed transition
pub const COMPLETED_MESSAGE: &str = "Done!";

/// Title used when the fetch engine reports none
pub const DEFAULT_TITLE: &str = "Unknown title";

/// Unique identifier for a task
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random id (UUID v4)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted and not yet finished
    Processing,
    /// Finished with a produced file
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions are permitted
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Lowercase name as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Payload of a completed task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Human-readable title of the fetched resource
    pub title: String,
    /// Location of the produced file on disk
    pub file_path: PathBuf,
    /// Public file name, used to build the download link
    pub file_name: String,
}

impl TaskResult {
    /// Build a result from the produced file's path; the public name is its last component
    pub fn from_path(title: Option<String>, path: impl Into<PathBuf>) -> Self {
        let file_path = path.into();
        let file_name = public_file_name(&file_path);
        Self {
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            file_path,
            file_name,
        }
    }
}

fn public_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Snapshot of one task's tracked lifecycle
///
/// Values handed out by the registry are copies; mutating one has no effect
/// on the registry's state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Latest human-readable status message
    pub message: String,
    /// Produced file, present only when completed
    pub result: Option<TaskResult>,
    /// Error text, present only when failed
    pub error: Option<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated
    pub updated_at: DateTime<Utc>,
    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A fresh task in the processing state
    pub fn new(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Processing,
            progress: 0,
            message: INITIAL_MESSAGE.to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Whether the task is completed or failed
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Task lifecycle event broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered and queued for execution
    Created {
        /// Task ID
        id: TaskId,
    },

    /// Progress or status message changed
    Progress {
        /// Task ID
        id: TaskId,
        /// Progress percentage (0-99)
        progress: u8,
        /// Latest status message
        message: String,
    },

    /// Task completed with a produced file
    Completed {
        /// Task ID
        id: TaskId,
        /// Title of the fetched resource
        title: String,
        /// Public file name
        file_name: String,
    },

    /// Task failed
    Failed {
        /// Task ID
        id: TaskId,
        /// User-facing error text
        error: String,
    },
}

impl Event {
    /// SSE event name for this event
    pub fn name(&self) -> &'static str {
        match self {
            Event::Created { .. } => "created",
            Event::Progress { .. } => "progress",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
        }
    }

    /// Describe the current state of `task` as an event
    pub(crate) fn for_task(task: &Task) -> Self {
        match (&task.status, &task.result, &task.error) {
            (TaskStatus::Completed, Some(result), _) => Event::Completed {
                id: task.id.clone(),
                title: result.title.clone(),
                file_name: result.file_name.clone(),
            },
            (TaskStatus::Failed, _, error) => Event::Failed {
                id: task.id.clone(),
                error: error.clone().unwrap_or_default(),
            },
            _ => Event::Progress {
                id: task.id.clone(),
                progress: task.progress,
                message: task.message.clone(),
            },
        }
    }
}
