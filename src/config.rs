//! Configuration types for vidfetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

/// Download behavior configuration (output directory, concurrency)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory produced files are written to and served from (default: "downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum number of tasks executing at once (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_tasks: default_max_concurrent(),
        }
    }
}

/// Which fetch engine executes tasks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// External `yt-dlp` binary
    #[default]
    Ytdlp,
    /// Plain HTTP(S) GET of the URL
    Http,
}

/// Fetch engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine implementation (default: ytdlp)
    #[serde(default)]
    pub kind: EngineKind,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// yt-dlp format selector
    #[serde(default = "default_format")]
    pub format: String,

    /// Retries per download (default: 15)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Retries per fragment (default: 15)
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,

    /// Fragments fetched in parallel for segmented media (default: 12)
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            ytdlp_path: None,
            search_path: true,
            format: default_format(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            concurrent_fragments: default_concurrent_fragments(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for vidfetch
///
/// Every field has a default, so an empty TOML file is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Output directory and concurrency
    #[serde(default)]
    pub download: DownloadConfig,

    /// Fetch engine selection and options
    #[serde(default)]
    pub engine: EngineConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerIntegrationConfig,

    /// How long shutdown waits for running tasks, in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            engine: EngineConfig::default(),
            server: ServerIntegrationConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid TOML: {}", e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot express constraints for
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_tasks == 0 {
            return Err(Error::Config {
                message: "max_concurrent_tasks must be at least 1".to_string(),
                key: Some("max_concurrent_tasks".to_string()),
            });
        }
        if self.engine.format.trim().is_empty() {
            return Err(Error::Config {
                message: "format must not be empty".to_string(),
                key: Some("format".to_string()),
            });
        }
        Ok(())
    }

    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "best[ext=mp4][height<=480]/best[ext=webm][height<=480]/best".to_string()
}

fn default_retries() -> u32 {
    15
}

fn default_concurrent_fragments() -> u32 {
    12
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
