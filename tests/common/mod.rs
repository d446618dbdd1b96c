//! Shared helpers for integration tests
//!
//! Scripted fetch engines plus wait helpers that poll an orchestrator until
//! a task settles.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use vidfetch::{
    DownloadProgress, EngineError, FetchEngine, FetchRequest, FetchedFile, Orchestrator,
    ProgressReporter, Task, TaskId,
};

/// Result of waiting for a task to settle
#[derive(Debug)]
pub enum WaitResult {
    /// Task reached a terminal state
    Settled(Task),
    /// Timeout waiting for a terminal state
    Timeout,
}

/// Poll `id` until it is completed or failed
pub async fn wait_for_terminal(
    orchestrator: &Orchestrator,
    id: &TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            if let Ok(task) = orchestrator.status(id)
                && task.is_terminal()
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match result {
        Ok(task) => WaitResult::Settled(task),
        Err(_) => WaitResult::Timeout,
    }
}

/// Like [`wait_for_terminal`] but panics on timeout
pub async fn settled(orchestrator: &Orchestrator, id: &TaskId) -> Task {
    match wait_for_terminal(orchestrator, id, Duration::from_secs(10)).await {
        WaitResult::Settled(task) => task,
        WaitResult::Timeout => panic!("task {id} did not settle in time"),
    }
}

/// Poll until the task's progress reaches at least `percent`
pub async fn wait_for_progress(orchestrator: &Orchestrator, id: &TaskId, percent: u8) -> Task {
    for _ in 0..1000 {
        let task = orchestrator.status(id).expect("task should exist");
        if task.progress >= percent {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {id} never reached {percent}%");
}

/// Engine that writes `{task_id}_Title.mp4` after reporting 50 of 100 bytes
pub struct TitleEngine;

#[async_trait]
impl FetchEngine for TitleEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> Result<FetchedFile, EngineError> {
        reporter.downloading(DownloadProgress::bytes(50, Some(100)));
        let path = request
            .output_dir
            .join(format!("{}_Title.mp4", request.task_id));
        tokio::fs::write(&path, b"video")
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?;
        reporter.finished(path.clone(), Some("Title".into()));
        Ok(FetchedFile {
            path,
            title: Some("Title".into()),
        })
    }

    fn name(&self) -> &str {
        "title"
    }
}

/// Engine whose fetches block until a permit is released, recording the
/// highest number of fetches seen running at the same time
#[derive(Clone)]
pub struct GatedEngine {
    pub gate: Arc<Semaphore>,
    pub running: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub started: Arc<AtomicUsize>,
}

impl GatedEngine {
    /// Engine with a closed gate
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `n` blocked fetches finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Number of fetches that have started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of fetches currently blocked on the gate
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest observed number of concurrent fetches
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchEngine for GatedEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> Result<FetchedFile, EngineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        permit
            .map_err(|e| EngineError::Other(e.to_string()))?
            .forget();

        let path = request.output_dir.join(format!("{}_x.bin", request.task_id));
        reporter.finished(path.clone(), None);
        Ok(FetchedFile { path, title: None })
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Engine that panics in the middle of every fetch
pub struct PanickingEngine;

#[async_trait]
impl FetchEngine for PanickingEngine {
    async fn fetch(
        &self,
        _request: FetchRequest,
        reporter: ProgressReporter,
    ) -> Result<FetchedFile, EngineError> {
        reporter.downloading(DownloadProgress::fragments(1, 4));
        panic!("engine crashed mid-fetch");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Engine that fails every fetch with a fixed error
pub struct FailingEngine(pub EngineError);

#[async_trait]
impl FetchEngine for FailingEngine {
    async fn fetch(
        &self,
        _request: FetchRequest,
        _reporter: ProgressReporter,
    ) -> Result<FetchedFile, EngineError> {
        Err(self.0.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}
