use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playlist_mirror::app::App;
use playlist_mirror::config::{AppConfig, CliConfig, FileConfig, LoggingLevel, Quality};
use playlist_mirror::retry::RetryPolicy;
use playlist_mirror::tidal::{probe_fastest, TidalClient};
use tokio_util::sync::CancellationToken;

/// Timeout for search/metadata requests; audio transfers use their own client.
const API_TIMEOUT_SECS: u64 = 10;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Without this flag, ./config.toml is used
    /// when it exists.
    #[clap(short, long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the playlist CSV export to mirror.
    #[clap(long, value_parser = parse_path)]
    pub playlist: Option<PathBuf>,

    /// Directory the audio library is written into.
    #[clap(long, value_parser = parse_path)]
    pub download_dir: Option<PathBuf>,

    /// Directory holding the completed/failed cache documents.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Number of concurrent download workers.
    #[clap(long)]
    pub concurrent_downloads: Option<usize>,

    /// Audio quality to request from the streaming instance.
    #[clap(long)]
    pub quality: Option<Quality>,

    /// Whether previously failed tracks are attempted again.
    #[clap(long)]
    pub retry_failed: Option<bool>,

    /// Remove cached tracks and their files when they leave the playlist.
    #[clap(long, action = clap::ArgAction::SetTrue)]
    pub sync_removed: Option<bool>,

    /// Log verbosity; the LOG_LEVEL environment variable takes precedence.
    #[clap(long)]
    pub logging_level: Option<LoggingLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.exists() {
                Some(FileConfig::load(&default)?)
            } else {
                None
            }
        }
    };

    let cli_config = CliConfig {
        playlist_file: cli_args.playlist.clone(),
        download_dir: cli_args.download_dir.clone(),
        cache_dir: cli_args.cache_dir.clone(),
        concurrent_downloads: cli_args.concurrent_downloads,
        quality: cli_args.quality,
        retry_failed: cli_args.retry_failed,
        sync_removed: cli_args.sync_removed,
        logging_level: cli_args.logging_level,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(config.logging_level.level_filter().into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "Mirroring {} at {} quality with {} workers",
        config.playlist_file.display(),
        config.quality.as_param(),
        config.concurrent_downloads
    );

    let probe_timeout = Duration::from_secs(config.api.probe_timeout_secs);
    let api_base = probe_fastest(&config.api.api_instances, probe_timeout)
        .await
        .context("no API instance is reachable")?;
    info!("Using API instance {}", api_base);
    let stream_base = probe_fastest(&config.api.streaming_instances, probe_timeout)
        .await
        .context("no streaming instance is reachable")?;
    info!("Using streaming instance {}", stream_base);

    let client = TidalClient::new(
        api_base,
        stream_base,
        config.quality,
        RetryPolicy::new(&config.retry),
        API_TIMEOUT_SECS,
    )?;

    let shutdown = CancellationToken::new();
    let watcher_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, cancelling in-flight downloads");
            watcher_token.cancel();
        }
    });

    let app = App::new(config, client, shutdown)?;
    let summary = app.run().await?;

    if summary.failed > 0 {
        warn!(
            "Failed to download {} tracks; see failed.json for reasons.",
            summary.failed
        );
    }
    info!(
        "Completed {}/{} ({:.2}%) downloads.",
        summary.completed,
        summary.total,
        summary.percent()
    );

    Ok(())
}
