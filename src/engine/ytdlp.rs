//! yt-dlp engine using the external binary

use super::{FetchEngine, FetchRequest, FetchedFile};
use crate::config::EngineConfig;
use crate::error::{EngineError, Error, Result};
use crate::reporter::{DownloadProgress, ProgressEvent, ProgressReporter};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Prefix of the JSON progress lines requested via `--progress-template`
const PROGRESS_MARKER: &str = "[vidfetch:progress] ";

/// Prefix of the final title/path line requested via `--print after_move:`
const DONE_MARKER: &str = "[vidfetch:done] ";

/// Stderr lines kept for the failure diagnostic
const MAX_DIAGNOSTIC_LINES: usize = 50;

/// Download options passed to yt-dlp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YtDlpOptions {
    /// Format selector
    pub format: String,
    /// `--retries`
    pub retries: u32,
    /// `--fragment-retries`
    pub fragment_retries: u32,
    /// `--concurrent-fragments`
    pub concurrent_fragments: u32,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self::from(&config)
    }
}

impl From<&EngineConfig> for YtDlpOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            format: config.format.clone(),
            retries: config.retries,
            fragment_retries: config.fragment_retries,
            concurrent_fragments: config.concurrent_fragments,
        }
    }
}

/// Engine that executes the external `yt-dlp` binary
///
/// Progress is read from machine-readable marker lines yt-dlp is asked to
/// print, so the engine never scrapes its human-oriented output.
///
/// # Examples
///
/// ```no_run
/// use vidfetch::engine::YtDlpEngine;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let engine = YtDlpEngine::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let engine = YtDlpEngine::from_path().expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpEngine {
    binary_path: PathBuf,
    options: YtDlpOptions,
}

impl YtDlpEngine {
    /// Create an engine with an explicit binary path and default options
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            options: YtDlpOptions::default(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from configuration: explicit path first, then PATH if allowed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] keyed `ytdlp_path` when no binary is found.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let engine = match &config.ytdlp_path {
            Some(path) => Some(Self::new(path.clone())),
            None if config.search_path => Self::from_path(),
            None => None,
        };

        engine
            .map(|engine| engine.with_options(YtDlpOptions::from(config)))
            .ok_or_else(|| Error::Config {
                message: "yt-dlp binary not found; set ytdlp_path or install yt-dlp on PATH"
                    .to_string(),
                key: Some("ytdlp_path".to_string()),
            })
    }

    /// Replace the download options
    pub fn with_options(mut self, options: YtDlpOptions) -> Self {
        self.options = options;
        self
    }

    /// Path of the binary this engine runs
    pub fn binary_path(&self) -> &PathBuf {
        &self.binary_path
    }

    fn build_args(&self, request: &FetchRequest) -> Vec<String> {
        let template = request
            .output_dir
            .join(format!("{}_%(title)s.%(ext)s", request.task_id));

        vec![
            "-f".into(),
            self.options.format.clone(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".into(),
            "--retries".into(),
            self.options.retries.to_string(),
            "--fragment-retries".into(),
            self.options.fragment_retries.to_string(),
            "--concurrent-fragments".into(),
            self.options.concurrent_fragments.to_string(),
            "--hls-use-mpegts".into(),
            "--no-warnings".into(),
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!("download:{PROGRESS_MARKER}%(progress)j"),
            "--print".into(),
            format!("after_move:{DONE_MARKER}%(.{{title,filepath}})j"),
            "--no-simulate".into(),
            "--".into(),
            request.url.clone(),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct RawProgress {
    status: Option<String>,
    downloaded_bytes: Option<f64>,
    total_bytes: Option<f64>,
    total_bytes_estimate: Option<f64>,
    fragment_index: Option<f64>,
    fragment_count: Option<f64>,
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawDone {
    title: Option<String>,
    filepath: Option<String>,
}

fn as_count(value: Option<f64>) -> Option<u64> {
    value.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64)
}

/// Parse one line of yt-dlp output into an engine event.
///
/// Returns `None` for anything that is not one of our marker lines, and for
/// progress lines whose status is not `downloading`.
fn parse_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim();

    if let Some(json) = line.strip_prefix(PROGRESS_MARKER) {
        let raw: RawProgress = serde_json::from_str(json).ok()?;
        if raw.status.as_deref() != Some("downloading") {
            return None;
        }
        return Some(ProgressEvent::Downloading(DownloadProgress {
            fragment_index: as_count(raw.fragment_index),
            fragment_count: as_count(raw.fragment_count),
            downloaded_bytes: as_count(raw.downloaded_bytes),
            total_bytes: as_count(raw.total_bytes.or(raw.total_bytes_estimate)),
            speed_bps: raw.speed.filter(|s| s.is_finite()),
        }));
    }

    if let Some(json) = line.strip_prefix(DONE_MARKER) {
        let raw: RawDone = serde_json::from_str(json).ok()?;
        let path = raw.filepath.filter(|p| !p.is_empty())?;
        return Some(ProgressEvent::Finished {
            path: PathBuf::from(path),
            title: raw.title,
        });
    }

    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, ?stream, "Stopped reading yt-dlp output");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl FetchEngine for YtDlpEngine {
    async fn fetch(
        &self,
        request: FetchRequest,
        reporter: ProgressReporter,
    ) -> std::result::Result<FetchedFile, EngineError> {
        let args = self.build_args(&request);
        tracing::debug!(task_id = %request.task_id, url = %request.url, "Running yt-dlp");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Other(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Other("yt-dlp stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Other("yt-dlp stderr was not captured".to_string()))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        forward_lines(stdout, Stream::Stdout, line_tx.clone());
        forward_lines(stderr, Stream::Stderr, line_tx);

        let mut diagnostic: VecDeque<String> = VecDeque::new();
        let mut produced: Option<FetchedFile> = None;

        while let Some((stream, line)) = line_rx.recv().await {
            match parse_line(&line) {
                Some(ProgressEvent::Finished { path, title }) => {
                    produced = Some(FetchedFile {
                        path: path.clone(),
                        title: title.clone(),
                    });
                    reporter.finished(path, title);
                }
                Some(event) => {
                    reporter.report(event);
                }
                None if stream == Stream::Stderr && !line.trim().is_empty() => {
                    if diagnostic.len() == MAX_DIAGNOSTIC_LINES {
                        diagnostic.pop_front();
                    }
                    diagnostic.push_back(line);
                }
                None => {
                    tracing::trace!(task_id = %request.task_id, line = %line, "yt-dlp output");
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Other(format!("Failed to wait for yt-dlp: {}", e)))?;

        if !status.success() {
            let text = Vec::from(diagnostic).join("\n");
            return Err(EngineError::Fetch(if text.trim().is_empty() {
                format!("yt-dlp exited with {}", status)
            } else {
                text
            }));
        }

        let file = produced.ok_or_else(|| {
            EngineError::Other("yt-dlp finished without reporting an output file".to_string())
        })?;

        if tokio::fs::metadata(&file.path).await.is_err() {
            return Err(EngineError::Other(format!(
                "yt-dlp reported {} but the file does not exist",
                file.path.display()
            )));
        }

        Ok(file)
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}
