//! Direct HTTP(S) engine

use super::{FetchEngine, FetchRequest, FetchedFile};
use crate::error::EngineError;
use crate::reporter::{DownloadProgress, ProgressReporter};
use crate::utils::filename_from_response;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Minimum interval between progress reports
const REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Engine that fetches the URL with a plain GET and streams the body to disk
#[derive(Clone, Default)]
pub struct HttpEngine {
    client: reqwest::Client,
}

impl HttpEngine {
    /// Create an engine with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that uses `client`
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn local_error(path: &Path, e: std::io::Error) -> EngineError {
    EngineError::Other(format!("failed to write {}: {}", path.display(), e))
}

async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    let total = response.content_length();
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| local_error(path, e))?;

    let started = Instant::now();
    let mut last_report = started;
    let mut downloaded: u64 = 0;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| EngineError::Fetch(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| local_error(path, e))?;
        downloaded += chunk.len() as u64;

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();
            reporter.downloading(progress(downloaded, total, started));
        }
    }

    file.flush().await.map_err(|e| local_error(path, e))?;
    reporter.downloading(progress(downloaded, total, started));
    Ok(())
}

fn progress(downloaded: u64, total: Option<u64>, started: Instant) -> DownloadProgress {
    let elapsed = started.elapsed().as_secs_f64();
    let progress = DownloadProgress::bytes(downloaded, total);
    if elapsed > 0.0 {
        progress.with_speed(downloaded as f64 / elapsed)
    } else {
        progress
    }
}

#[async_trait]
impl FetchEngine for HttpEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> Result<FetchedFile, EngineError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| EngineError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Fetch(format!("HTTP {}", status)));
        }

        let name = filename_from_response(&response, &request.url);
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| local_error(&request.output_dir, e))?;
        let path: PathBuf = request
            .output_dir
            .join(format!("{}_{}", request.task_id, name));

        tracing::debug!(task_id = %request.task_id, path = %path.display(), "Streaming response body");
        if let Err(e) = stream_to_file(response, &path, &reporter).await {
            tokio::fs::remove_file(&path).await.ok();
            return Err(e);
        }

        let title = Path::new(&name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        reporter.finished(path.clone(), title.clone());

        Ok(FetchedFile { path, title })
    }

    fn name(&self) -> &str {
        "http"
    }
}
