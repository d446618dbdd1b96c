//! Task orchestration: creating tasks, running their jobs and finalizing them.
//!
//! [`Orchestrator::start_task`] registers a task and hands a job to the
//! [`WorkerPool`]. The job runs the fetch engine while draining its progress
//! reports into the registry, then converges the task on exactly one terminal
//! state. Whatever happens inside the job (engine error, panic, the job being
//! dropped) the task never stays in `processing` once the job is gone.

use crate::config::Config;
use crate::engine::{FetchEngine, FetchRequest, FetchedFile};
use crate::error::{EngineError, Error, Result, TaskFailure};
use crate::pool::{WorkerPool, panic_message};
use crate::registry::{TaskRegistry, TaskUpdate, UpdateOutcome};
use crate::reporter::{self, ProgressReporter};
use crate::types::{Event, Task, TaskId, TaskResult};
use futures::FutureExt;
use regex::Regex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Error text returned when no URL was supplied
pub const MISSING_URL_MESSAGE: &str = "URL was not provided.";

/// Marker yt-dlp and similar tools put in front of fatal diagnostics
const ERROR_MARKER: &str = "ERROR:";

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").ok());

static LEADING_TAGS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\[[^\]]*\]\s*)+").ok());

fn strip(pattern: &Option<Regex>, text: &str) -> String {
    match pattern {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Reduce a raw engine diagnostic to one readable line.
///
/// ANSI escape codes are removed. The last line carrying an `ERROR:` marker
/// is preferred, otherwise the last non-empty line is used. The marker
/// itself, leading `[extractor]` tags and trailing periods are stripped.
pub fn sanitize_fetch_error(diagnostic: &str) -> String {
    let clean = strip(&ANSI_ESCAPE, diagnostic);
    let lines: Vec<&str> = clean
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let chosen = lines
        .iter()
        .rev()
        .find(|line| line.contains(ERROR_MARKER))
        .or_else(|| lines.last())
        .copied()
        .unwrap_or_default();

    let text = match chosen.find(ERROR_MARKER) {
        Some(pos) => &chosen[pos + ERROR_MARKER.len()..],
        None => chosen,
    };

    let text = strip(&LEADING_TAGS, text.trim());
    let text = text.trim().trim_end_matches('.').trim_end();
    if text.is_empty() {
        "unknown error".to_string()
    } else {
        text.to_string()
    }
}

/// Fails the task if the job exits without having finalized it.
///
/// Runs on every exit path of the job, including unwinding and the job's
/// future being dropped. A no-op when the task is already terminal.
struct AbortGuard {
    registry: TaskRegistry,
    id: TaskId,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Ok(UpdateOutcome::Applied) = self
            .registry
            .fail(&self.id, TaskFailure::Aborted.to_string())
        {
            tracing::warn!(task_id = %self.id, "Task aborted before finalization");
        }
    }
}

type FetchOutcome = std::result::Result<
    std::result::Result<FetchedFile, EngineError>,
    Box<dyn Any + Send>,
>;

/// One task's unit of work, executed inside a pool slot
struct TaskJob {
    id: TaskId,
    url: String,
    output_dir: PathBuf,
    registry: TaskRegistry,
    engine: Arc<dyn FetchEngine>,
}

impl TaskJob {
    async fn run(self) {
        let _guard = AbortGuard {
            registry: self.registry.clone(),
            id: self.id.clone(),
        };

        tracing::info!(task_id = %self.id, engine = self.engine.name(), "Task started");

        let (progress, mut updates) = ProgressReporter::channel(self.id.clone());
        let request = FetchRequest::new(self.id.clone(), self.url.clone(), self.output_dir.clone());
        let engine = Arc::clone(&self.engine);
        let fetch = AssertUnwindSafe(async move { engine.fetch(request, progress).await })
            .catch_unwind();
        tokio::pin!(fetch);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(update) = updates.recv() => {
                    reporter::apply_update(&self.registry, update).ok();
                }
                outcome = &mut fetch => break outcome,
            }
        };

        // Apply whatever the engine reported right before returning
        updates.close();
        reporter::drain(&self.registry, &mut updates);

        self.finalize(outcome);
    }

    fn finalize(&self, outcome: FetchOutcome) {
        let update = match outcome {
            Ok(Ok(file)) => TaskUpdate::Complete(TaskResult::from_path(file.title, file.path)),
            Ok(Err(EngineError::Fetch(diagnostic))) => {
                tracing::warn!(task_id = %self.id, error = %diagnostic, "Fetch failed");
                TaskUpdate::Fail(TaskFailure::Fetch(sanitize_fetch_error(&diagnostic)).to_string())
            }
            Ok(Err(EngineError::Other(detail))) => {
                tracing::error!(task_id = %self.id, error = %detail, "Engine error");
                TaskUpdate::Fail(TaskFailure::Unexpected(detail).to_string())
            }
            Err(panic) => {
                let detail = panic_message(&*panic);
                tracing::error!(task_id = %self.id, panic = %detail, "Engine panicked");
                TaskUpdate::Fail(TaskFailure::Unexpected(detail).to_string())
            }
        };

        match self.registry.update(&self.id, update) {
            Ok(UpdateOutcome::Applied) => {
                tracing::info!(task_id = %self.id, "Task finalized");
            }
            Ok(UpdateOutcome::Ignored) => {
                tracing::debug!(task_id = %self.id, "Task already terminal, finalization skipped");
            }
            Err(e) => {
                tracing::error!(task_id = %self.id, error = %e, "Failed to finalize task");
            }
        }
    }
}

/// Entry point for submitting tasks and querying their state (cloneable - shares state)
#[derive(Clone)]
pub struct Orchestrator {
    registry: TaskRegistry,
    pool: WorkerPool,
    engine: Arc<dyn FetchEngine>,
    output_dir: PathBuf,
    event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator running at most `max_concurrent` tasks at once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        engine: Arc<dyn FetchEngine>,
        output_dir: impl Into<PathBuf>,
        max_concurrent: usize,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: TaskRegistry::new(event_tx.clone()),
            pool: WorkerPool::new(max_concurrent),
            engine,
            output_dir: output_dir.into(),
            event_tx,
        }
    }

    /// Create an orchestrator from the download section of `config`
    pub fn from_config(config: &Config, engine: Arc<dyn FetchEngine>) -> Self {
        Self::new(
            engine,
            config.download.download_dir.clone(),
            config.download.max_concurrent_tasks,
        )
    }

    /// Register a task for `url` and queue its job. Returns immediately.
    ///
    /// The job is queued first but waits until the task is registered, so
    /// a task is only visible once its job is guaranteed to run, and the job
    /// never starts before the task is `processing`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `url` is blank
    /// - [`Error::ShuttingDown`] if the pool no longer accepts jobs
    ///
    /// In both cases no task is created.
    pub fn start_task(&self, url: &str) -> Result<TaskId> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Validation(MISSING_URL_MESSAGE.to_string()));
        }

        let id = TaskId::generate();
        let job = TaskJob {
            id: id.clone(),
            url: url.to_string(),
            output_dir: self.output_dir.clone(),
            registry: self.registry.clone(),
            engine: Arc::clone(&self.engine),
        };

        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        self.pool.submit(move || async move {
            // Dropped sender means registration failed; nothing to run
            if registered_rx.await.is_ok() {
                job.run().await;
            }
        })?;

        self.registry.create(id.clone())?;
        registered_tx.send(()).ok();

        tracing::info!(task_id = %id, url = %url, "Task queued");
        Ok(id)
    }

    /// Snapshot of a task's current state
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn status(&self, id: &TaskId) -> Result<Task> {
        self.registry.get(id)
    }

    /// Subscribe to task lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Directory produced files are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Stop accepting tasks and wait up to `timeout` for running ones.
    ///
    /// Returns `true` if every queued and running task finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        tracing::info!("Initiating graceful shutdown");
        self.pool.shutdown(timeout).await
    }
}
