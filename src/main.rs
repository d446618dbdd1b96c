//! vidfetch server binary
//!
//! Loads configuration, builds the configured fetch engine and serves the
//! REST API until SIGTERM or SIGINT.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vidfetch::{Config, EngineKind, Orchestrator, build_engine, run_with_shutdown};

#[derive(Parser)]
#[command(name = "vidfetch")]
#[command(about = "Asynchronous media fetch service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "VIDFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the API server to (overrides the config file)
    #[arg(short, long, env = "VIDFETCH_BIND")]
    bind: Option<SocketAddr>,

    /// Directory produced files are written to (overrides the config file)
    #[arg(short, long, env = "VIDFETCH_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Maximum number of tasks running at once (overrides the config file)
    #[arg(short = 'j', long, env = "VIDFETCH_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Fetch engine to use (overrides the config file)
    #[arg(long, value_parser = parse_engine)]
    engine: Option<EngineKind>,
}

fn parse_engine(raw: &str) -> Result<EngineKind, String> {
    match raw.to_ascii_lowercase().as_str() {
        "ytdlp" | "yt-dlp" => Ok(EngineKind::Ytdlp),
        "http" => Ok(EngineKind::Http),
        other => Err(format!("unknown engine {other:?}, expected ytdlp or http")),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: Cli) -> vidfetch::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };

    if let Some(bind) = cli.bind {
        config.server.api.bind_address = bind;
    }
    if let Some(dir) = cli.download_dir {
        config.download.download_dir = dir;
    }
    if let Some(max) = cli.max_concurrent {
        config.download.max_concurrent_tasks = max;
    }
    if let Some(kind) = cli.engine {
        config.engine.kind = kind;
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> vidfetch::Result<()> {
    let config = Arc::new(load_config(cli)?);

    tokio::fs::create_dir_all(config.download_dir()).await?;
    let engine = build_engine(&config.engine)?;

    tracing::info!(
        engine = engine.name(),
        download_dir = %config.download_dir().display(),
        max_concurrent_tasks = config.download.max_concurrent_tasks,
        "Starting vidfetch"
    );

    let orchestrator = Orchestrator::from_config(&config, engine);
    run_with_shutdown(orchestrator, config).await
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "vidfetch exited with an error");
            ExitCode::FAILURE
        }
    }
}
