//! # vidfetch
//!
//! Asynchronous media fetch service: clients submit a URL, poll the task's
//! progress and download the produced file once it completes.
//!
//! ## Architecture
//!
//! - [`Orchestrator`] accepts URLs, registers tasks and queues their jobs
//! - [`WorkerPool`] runs at most `max_concurrent_tasks` jobs at a time, FIFO
//! - [`TaskRegistry`] holds every task's state and broadcasts [`Event`]s
//! - [`ProgressReporter`] carries engine progress back into the registry
//! - [`FetchEngine`] implementations do the actual retrieval (yt-dlp, HTTP)
//! - [`api`] exposes all of it over HTTP
//!
//! ## Quick Start
//!
//! ```no_run
//! use vidfetch::{Config, Orchestrator, engine::build_engine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let engine = build_engine(&config.engine)?;
//!     let orchestrator = Orchestrator::from_config(&config, engine);
//!
//!     let task_id = orchestrator.start_task("https://example.com/watch?v=1")?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     println!("{:?}", orchestrator.status(&task_id)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::sync::Arc;

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Fetch engines
pub mod engine;
/// Error types
pub mod error;
/// Task submission and job execution
pub mod orchestrator;
/// Bounded worker pool
pub mod pool;
/// In-memory task registry
pub mod registry;
/// Progress reporting from engines
pub mod reporter;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, EngineConfig, EngineKind};
pub use engine::{FetchEngine, FetchRequest, FetchedFile, HttpEngine, YtDlpEngine, build_engine};
pub use error::{ApiError, EngineError, Error, ErrorDetail, Result, TaskFailure, ToHttpStatus};
pub use orchestrator::{Orchestrator, sanitize_fetch_error};
pub use pool::WorkerPool;
pub use registry::{TaskRegistry, TaskUpdate, UpdateOutcome};
pub use reporter::{DownloadProgress, ProgressEvent, ProgressReporter, ProgressUpdate};
pub use types::{Event, Task, TaskId, TaskResult, TaskStatus};

/// Serve the API until a termination signal arrives, then drain running tasks.
///
/// The listener stops first; queued and running tasks then get up to
/// `config.shutdown_timeout` to finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use vidfetch::{Config, Orchestrator, HttpEngine, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(Config::default());
///     let orchestrator = Orchestrator::from_config(&config, Arc::new(HttpEngine::new()));
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator, config).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: Orchestrator, config: Arc<Config>) -> Result<()> {
    let timeout = config.shutdown_timeout;
    api::start_api_server_with_shutdown(orchestrator.clone(), config, shutdown_signal()).await?;

    if !orchestrator.shutdown(timeout).await {
        tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Shutdown timed out with tasks still running"
        );
    }
    Ok(())
}

/// Resolve once the process receives a termination signal
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Resolve once the process receives Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
