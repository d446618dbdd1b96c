//! Fetch engines
//!
//! A fetch engine performs the actual retrieval for one task. The core never
//! depends on a concrete engine; it only sees the [`FetchEngine`] trait.
//! Two implementations are provided:
//!
//! - [`YtDlpEngine`]: drives the external `yt-dlp` binary
//! - [`HttpEngine`]: plain HTTP(S) GET, streaming the body to disk
//!
//! ## Usage
//!
//! ```no_run
//! use vidfetch::engine::{FetchEngine, FetchRequest, HttpEngine};
//! use vidfetch::reporter::ProgressReporter;
//! use vidfetch::types::TaskId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = HttpEngine::new();
//!     let id = TaskId::generate();
//!     let (reporter, _updates) = ProgressReporter::channel(id.clone());
//!
//!     let file = engine
//!         .fetch(
//!             FetchRequest::new(id, "https://example.com/clip.mp4", "downloads"),
//!             reporter,
//!         )
//!         .await?;
//!     println!("saved to {}", file.path.display());
//!     Ok(())
//! }
//! ```

mod http;
mod ytdlp;

pub use http::HttpEngine;
pub use ytdlp::{YtDlpEngine, YtDlpOptions};

use crate::config::{EngineConfig, EngineKind};
use crate::error::{EngineError, Result};
use crate::reporter::ProgressReporter;
use crate::types::TaskId;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an engine needs to fetch one resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Task the fetch belongs to; used to prefix the produced file name
    pub task_id: TaskId,
    /// Remote resource to fetch
    pub url: String,
    /// Directory the produced file is written to
    pub output_dir: PathBuf,
}

impl FetchRequest {
    /// Create a request
    pub fn new(task_id: TaskId, url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            task_id,
            url: url.into(),
            output_dir: output_dir.into(),
        }
    }
}

/// File produced by a successful fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFile {
    /// Location of the file on disk
    pub path: PathBuf,
    /// Title of the fetched resource, if the engine learned one
    pub title: Option<String>,
}

/// Trait for fetch engines
///
/// Implementations may report any number of progress events and at most
/// one `Finished` event through `reporter`. They classify their failures:
/// [`EngineError::Fetch`] for expected retrieval problems whose diagnostic
/// is meaningful to the user, [`EngineError::Other`] for everything else.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Fetch `request.url` into `request.output_dir`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Fetch`] when the resource cannot be retrieved
    /// and [`EngineError::Other`] on local faults (spawn failure, disk I/O).
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> std::result::Result<FetchedFile, EngineError>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Build the engine selected by `config`
///
/// # Errors
///
/// Returns [`crate::Error::Config`] when the yt-dlp engine is selected but no
/// binary can be located.
pub fn build_engine(config: &EngineConfig) -> Result<Arc<dyn FetchEngine>> {
    let engine: Arc<dyn FetchEngine> = match config.kind {
        EngineKind::Ytdlp => Arc::new(YtDlpEngine::from_config(config)?),
        EngineKind::Http => Arc::new(HttpEngine::new()),
    };
    tracing::info!(engine = engine.name(), "Fetch engine ready");
    Ok(engine)
}
