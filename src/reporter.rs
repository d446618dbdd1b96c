//! Progress reporting from fetch engines into the task registry.
//!
//! A fetch engine never touches the registry. It is handed a
//! [`ProgressReporter`] which sends [`ProgressUpdate`]s, keyed by task id,
//! over an unbounded channel. The job that owns the receiving end drains
//! those updates into the registry with [`apply_update`] / [`drain`].

use crate::error::Result;
use crate::registry::{TaskRegistry, TaskUpdate, UpdateOutcome};
use crate::types::{MAX_PROCESSING_PROGRESS, TaskId, TaskResult};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Bytes per MiB, for the cosmetic speed annotation
const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Incremental download progress as reported by an engine.
///
/// Every field is optional; engines fill in whatever they know.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DownloadProgress {
    /// Index of the fragment currently being fetched
    pub fragment_index: Option<u64>,
    /// Total number of fragments
    pub fragment_count: Option<u64>,
    /// Bytes fetched so far
    pub downloaded_bytes: Option<u64>,
    /// Total size in bytes
    pub total_bytes: Option<u64>,
    /// Current speed in bytes per second
    pub speed_bps: Option<f64>,
}

impl DownloadProgress {
    /// Byte-based progress
    pub fn bytes(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            downloaded_bytes: Some(downloaded_bytes),
            total_bytes,
            ..Default::default()
        }
    }

    /// Fragment-based progress
    pub fn fragments(fragment_index: u64, fragment_count: u64) -> Self {
        Self {
            fragment_index: Some(fragment_index),
            fragment_count: Some(fragment_count),
            ..Default::default()
        }
    }

    /// Attach a speed annotation
    pub fn with_speed(mut self, speed_bps: f64) -> Self {
        self.speed_bps = Some(speed_bps);
        self
    }

    /// Percentage clamped to `[0, 99]`, or `None` when there is not enough data.
    ///
    /// Fragment counts take precedence over byte totals.
    pub fn percent(&self) -> Option<u8> {
        let ratio = match (self.fragment_count, self.total_bytes) {
            (Some(count), _) if count > 0 => {
                self.fragment_index.unwrap_or(0) as f64 / count as f64
            }
            (_, Some(total)) if total > 0 => {
                self.downloaded_bytes.unwrap_or(0) as f64 / total as f64
            }
            _ => return None,
        };

        Some((ratio * 100.0).clamp(0.0, f64::from(MAX_PROCESSING_PROGRESS)) as u8)
    }

    /// Status message, annotated with speed when known
    pub fn status_message(&self) -> String {
        match self.speed_bps {
            Some(speed) if speed > 0.0 => {
                format!("Downloading ({:.2} MiB/s)", speed / BYTES_PER_MIB)
            }
            _ => "Downloading...".to_string(),
        }
    }
}

/// Raw event emitted by a fetch engine
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Work is ongoing
    Downloading(DownloadProgress),
    /// The engine produced its final file
    Finished {
        /// Location of the produced file
        path: PathBuf,
        /// Title of the fetched resource, if known
        title: Option<String>,
    },
}

impl ProgressEvent {
    /// Translate this event into a registry mutation
    pub fn into_update(self) -> TaskUpdate {
        match self {
            ProgressEvent::Downloading(progress) => TaskUpdate::Progress {
                percent: progress.percent(),
                message: Some(progress.status_message()),
            },
            ProgressEvent::Finished { path, title } => {
                TaskUpdate::Complete(TaskResult::from_path(title, path))
            }
        }
    }
}

/// Event addressed to one task
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// The event itself
    pub event: ProgressEvent,
}

/// Handle a fetch engine uses to report progress for one task
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    task_id: TaskId,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    /// Create a reporter for `task_id` and the receiver its updates arrive on
    pub fn channel(task_id: TaskId) -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { task_id, tx }, rx)
    }

    /// Task this reporter is bound to
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Send an event. Returns `false` once the receiving job has stopped listening.
    pub fn report(&self, event: ProgressEvent) -> bool {
        self.tx
            .send(ProgressUpdate {
                task_id: self.task_id.clone(),
                event,
            })
            .is_ok()
    }

    /// Report incremental progress
    pub fn downloading(&self, progress: DownloadProgress) -> bool {
        self.report(ProgressEvent::Downloading(progress))
    }

    /// Report the produced file
    pub fn finished(&self, path: impl Into<PathBuf>, title: Option<String>) -> bool {
        self.report(ProgressEvent::Finished {
            path: path.into(),
            title,
        })
    }
}

/// Apply one engine event to `id`'s task
pub fn apply_event(
    registry: &TaskRegistry,
    id: &TaskId,
    event: ProgressEvent,
) -> Result<UpdateOutcome> {
    registry.update(id, event.into_update())
}

/// Apply a received update to the task it is addressed to
pub fn apply_update(registry: &TaskRegistry, update: ProgressUpdate) -> Result<UpdateOutcome> {
    let ProgressUpdate { task_id, event } = update;
    match apply_event(registry, &task_id, event) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Dropping progress update");
            Err(e)
        }
    }
}

/// Apply every update currently queued on `rx` without waiting for more.
///
/// Returns the number of updates consumed.
pub fn drain(registry: &TaskRegistry, rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>) -> usize {
    let mut drained = 0;
    while let Ok(update) = rx.try_recv() {
        apply_update(registry, update).ok();
        drained += 1;
    }
    drained
}
