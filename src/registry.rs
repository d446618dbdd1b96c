//! In-memory task registry.
//!
//! The registry is the single owner of every [`Task`]. Readers get snapshot
//! copies; writers go through [`TaskRegistry::update`], which applies one
//! [`TaskUpdate`] under the registry lock. Locks are held only for the
//! duration of a map operation and never across an `.await`.

use crate::error::{Error, Result};
use crate::types::{
    COMPLETED_MESSAGE, Event, MAX_PROCESSING_PROGRESS, Task, TaskId, TaskResult, TaskStatus,
};
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// A single mutation applied atomically to one task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Raise progress (clamped to 99, never lowered) and/or replace the message
    Progress {
        /// New progress percentage, if the engine reported enough data to compute one
        percent: Option<u8>,
        /// New status message
        message: Option<String>,
    },
    /// Transition to completed with the produced file
    Complete(TaskResult),
    /// Transition to failed with a user-facing error
    Fail(String),
}

/// Whether an update changed the task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was applied
    Applied,
    /// The task was already terminal; nothing changed
    Ignored,
}

impl Task {
    fn apply(&mut self, update: TaskUpdate) -> UpdateOutcome {
        if self.is_terminal() {
            return UpdateOutcome::Ignored;
        }

        match update {
            TaskUpdate::Progress { percent, message } => {
                if let Some(percent) = percent {
                    self.progress = self.progress.max(percent.min(MAX_PROCESSING_PROGRESS));
                }
                if let Some(message) = message {
                    self.message = message;
                }
            }
            TaskUpdate::Complete(result) => {
                self.status = TaskStatus::Completed;
                self.progress = 100;
                self.message = COMPLETED_MESSAGE.to_string();
                self.result = Some(result);
                self.error = None;
                self.finished_at = Some(Utc::now());
            }
            TaskUpdate::Fail(error) => {
                self.status = TaskStatus::Failed;
                self.error = Some(error);
                self.result = None;
                self.finished_at = Some(Utc::now());
            }
        }

        self.updated_at = Utc::now();
        UpdateOutcome::Applied
    }
}

/// Concurrency-safe map from task id to task (cloneable - shares the same map)
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    event_tx: broadcast::Sender<Event>,
}

impl TaskRegistry {
    /// Create an empty registry that publishes changes on `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Insert a new processing task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if `id` is already registered.
    pub fn create(&self, id: TaskId) -> Result<Task> {
        let task = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            match tasks.entry(id.clone()) {
                Entry::Occupied(_) => return Err(Error::DuplicateId { id }),
                Entry::Vacant(slot) => slot.insert(Task::new(id.clone())).clone(),
            }
        };

        self.event_tx.send(Event::Created { id }).ok();
        Ok(task)
    }

    /// Snapshot of the task's current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound { id: id.clone() })
    }

    /// Apply `update` to the task atomically.
    ///
    /// Terminal tasks are immutable: any update to them returns
    /// [`UpdateOutcome::Ignored`], which makes the terminal transition
    /// first-writer-wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<UpdateOutcome> {
        let (outcome, event) = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| Error::NotFound { id: id.clone() })?;
            let outcome = task.apply(update);
            let event = (outcome == UpdateOutcome::Applied).then(|| Event::for_task(task));
            (outcome, event)
        };

        if let Some(event) = event {
            self.event_tx.send(event).ok();
        }
        Ok(outcome)
    }

    /// Raise progress and/or replace the status message
    pub fn report_progress(
        &self,
        id: &TaskId,
        percent: Option<u8>,
        message: Option<String>,
    ) -> Result<UpdateOutcome> {
        self.update(id, TaskUpdate::Progress { percent, message })
    }

    /// Transition to completed (no-op if already terminal)
    pub fn complete(&self, id: &TaskId, result: TaskResult) -> Result<UpdateOutcome> {
        self.update(id, TaskUpdate::Complete(result))
    }

    /// Transition to failed (no-op if already terminal)
    pub fn fail(&self, id: &TaskId, error: impl Into<String>) -> Result<UpdateOutcome> {
        self.update(id, TaskUpdate::Fail(error.into()))
    }

    /// Snapshots of all tasks, oldest first
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no task has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
