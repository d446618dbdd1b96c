//! Bounded worker pool that executes jobs out of band.
//!
//! Jobs are queued on an unbounded FIFO channel so [`WorkerPool::submit`]
//! never waits. A single dispatcher task pops jobs in order, acquires a
//! permit from the concurrency semaphore and spawns the job holding that
//! permit. At most `capacity` jobs run at any moment.

use crate::error::{Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, mpsc};

type BoxedJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Shared counters observed by the dispatcher, the jobs and `shutdown`
struct PoolState {
    active: AtomicUsize,
    queued: AtomicUsize,
    accepting: AtomicBool,
    idle: Notify,
}

impl PoolState {
    fn is_idle(&self) -> bool {
        self.active.load(Ordering::SeqCst) == 0 && self.queued.load(Ordering::SeqCst) == 0
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

/// Releases an active slot when the job's task ends, however it ends
struct ActiveSlot {
    state: Arc<PoolState>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.notify_if_idle();
    }
}

/// Fixed-capacity pool of execution slots (cloneable - shares the same pool)
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<BoxedJob>,
    state: Arc<PoolState>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool with `capacity` slots and start its dispatcher.
    ///
    /// Must be called from within a Tokio runtime. A capacity of zero is
    /// raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(PoolState {
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            idle: Notify::new(),
        });

        tokio::spawn(run_dispatcher(
            rx,
            Arc::new(Semaphore::new(capacity)),
            Arc::clone(&state),
        ));

        tracing::debug!(capacity, "Worker pool started");
        Self {
            tx,
            state,
            capacity,
        }
    }

    /// Queue `job` for execution. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun.
    pub fn submit<F, Fut>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Count the job before checking `accepting` so a concurrent shutdown
        // either sees it queued or makes this check fail
        self.state.queued.fetch_add(1, Ordering::SeqCst);
        if !self.is_accepting() {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            self.state.notify_if_idle();
            return Err(Error::ShuttingDown);
        }

        let boxed: BoxedJob = Box::new(move || job().boxed());
        if self.tx.send(boxed).is_err() {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            self.state.notify_if_idle();
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Number of execution slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently running
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a free slot
    pub fn queued(&self) -> usize {
        self.state.queued.load(Ordering::SeqCst)
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait up to `timeout` for queued and running
    /// jobs to finish.
    ///
    /// Returns `true` if the pool drained in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.state.accepting.store(false, Ordering::SeqCst);
        tracing::info!(
            active = self.active(),
            queued = self.queued(),
            "Worker pool stopped accepting jobs"
        );

        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => {
                tracing::info!("All pool jobs completed");
                true
            }
            Err(_) => {
                tracing::warn!(
                    active = self.active(),
                    queued = self.queued(),
                    "Timeout waiting for pool jobs to complete"
                );
                false
            }
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<BoxedJob>,
    semaphore: Arc<Semaphore>,
    state: Arc<PoolState>,
) {
    while let Some(job) = rx.recv().await {
        // Semaphore permits are granted in FIFO order, preserving submission order
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!("Worker pool semaphore closed, dispatcher exiting");
                break;
            }
        };

        state.active.fetch_add(1, Ordering::SeqCst);
        state.queued.fetch_sub(1, Ordering::SeqCst);
        let slot = ActiveSlot {
            state: Arc::clone(&state),
        };

        tokio::spawn(async move {
            let _permit = permit;
            let _slot = slot;
            if let Err(panic) = AssertUnwindSafe(async move { job().await })
                .catch_unwind()
                .await
            {
                tracing::error!(panic = %panic_message(&*panic), "Pool job panicked");
            }
        });
    }

    tracing::debug!("Worker pool dispatcher stopped");
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
