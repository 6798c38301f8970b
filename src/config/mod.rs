mod file_config;

pub use file_config::{
    ApiConfig, DownloaderConfig, FileConfig, LyricsConfig, PathsConfig,
};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

const DEFAULT_API_INSTANCES: [&str; 2] = [
    "https://tidal-api.binimum.org",
    "https://monochrome-api.samidy.com",
];

const DEFAULT_STREAMING_INSTANCES: [&str; 2] = [
    "https://tidal.kinoplus.online",
    "https://triton.squid.wtf",
];

const DEFAULT_LRCLIB_URL: &str = "https://lrclib.net/api";

/// Audio quality requested from the streaming instance. Decides both the
/// wire parameter and the container extension of downloaded files.
#[derive(PartialEq, Eq, Clone, Copy, Debug, clap::ValueEnum)]
pub enum Quality {
    Lossless,
    High,
    Low,
}

impl Default for Quality {
    fn default() -> Self {
        Self::High
    }
}

impl Quality {
    /// Value of the `quality` query parameter on playback lookups.
    pub fn as_param(&self) -> &'static str {
        match self {
            Quality::Lossless => "LOSSLESS",
            Quality::High => "HIGH",
            Quality::Low => "LOW",
        }
    }

    /// File extension (with dot) for assets at this quality.
    pub fn extension(&self) -> &'static str {
        match self {
            Quality::Lossless => ".flac",
            Quality::High | Quality::Low => ".m4a",
        }
    }
}

#[derive(PartialEq, PartialOrd, Clone, Copy, Debug, clap::ValueEnum)]
pub enum LoggingLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LoggingLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LoggingLevel {
    /// Default directive for the tracing filter; `LOG_LEVEL` env overrides.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LoggingLevel::Trace => LevelFilter::TRACE,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub playlist_file: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub concurrent_downloads: Option<usize>,
    pub quality: Option<Quality>,
    pub retry_failed: Option<bool>,
    pub sync_removed: Option<bool>,
    pub logging_level: Option<LoggingLevel>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub playlist_file: PathBuf,
    pub download_root: PathBuf,
    pub cache_dir: PathBuf,
    pub logging_level: LoggingLevel,
    pub quality: Quality,
    pub concurrent_downloads: usize,
    pub retry_failed: bool,
    pub prefer_tidal_naming: bool,
    pub windows_safe_names: bool,
    pub sync_removed: bool,

    // Feature configs (with defaults)
    pub retry: RetrySettings,
    pub lyrics: LyricsSettings,
    pub api: ApiSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present; defaults apply last.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let paths = file.paths.unwrap_or_default();
        let downloader = file.downloader.unwrap_or_default();
        let lyrics_file = file.lyrics.unwrap_or_default();
        let api_file = file.api.unwrap_or_default();

        let playlist_file = paths
            .playlist_file
            .map(PathBuf::from)
            .or_else(|| cli.playlist_file.clone())
            .unwrap_or_else(|| PathBuf::from("playlist.csv"));

        let download_root = paths
            .download_dir
            .map(PathBuf::from)
            .or_else(|| cli.download_dir.clone())
            .unwrap_or_else(|| PathBuf::from("downloads"));

        let cache_dir = paths
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from("cache"));

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .or(cli.logging_level)
            .unwrap_or_default();

        let quality = downloader
            .quality
            .and_then(|s| parse_quality(&s))
            .or(cli.quality)
            .unwrap_or_default();

        let concurrent_downloads = downloader
            .concurrent_downloads
            .or(cli.concurrent_downloads)
            .unwrap_or(3);
        if concurrent_downloads == 0 {
            bail!("concurrent_downloads must be at least 1");
        }

        let retry_failed = downloader.retry_failed.or(cli.retry_failed).unwrap_or(true);
        let prefer_tidal_naming = downloader.prefer_tidal_naming.unwrap_or(false);
        let windows_safe_names = downloader.windows_safe_filenames.unwrap_or(true);
        let sync_removed = downloader.sync_removed.or(cli.sync_removed).unwrap_or(false);

        let retry = RetrySettings {
            max_retries: downloader.max_retries.unwrap_or(3),
            initial_backoff_secs: downloader.initial_backoff_secs.unwrap_or(2),
            max_backoff_secs: downloader.max_backoff_secs.unwrap_or(30),
            backoff_multiplier: downloader.backoff_multiplier.unwrap_or(2.0),
        };

        let lyrics = LyricsSettings {
            enabled: lyrics_file.enabled.unwrap_or(true),
            unsynced: lyrics_file.unsynced.unwrap_or(false),
            concurrency: lyrics_file.concurrency.unwrap_or(5),
        };
        if lyrics.concurrency == 0 {
            bail!("lyrics concurrency must be at least 1");
        }

        let api = ApiSettings {
            api_instances: api_file
                .api_instances
                .unwrap_or_else(|| default_instances(&DEFAULT_API_INSTANCES)),
            streaming_instances: api_file
                .streaming_instances
                .unwrap_or_else(|| default_instances(&DEFAULT_STREAMING_INSTANCES)),
            lrclib_url: api_file
                .lrclib_url
                .unwrap_or_else(|| DEFAULT_LRCLIB_URL.to_string()),
            probe_timeout_secs: api_file.probe_timeout_secs.unwrap_or(5),
        };
        if api.api_instances.is_empty() {
            bail!("at least one API instance must be configured");
        }
        if api.streaming_instances.is_empty() {
            bail!("at least one streaming instance must be configured");
        }

        Ok(Self {
            playlist_file,
            download_root,
            cache_dir,
            logging_level,
            quality,
            concurrent_downloads,
            retry_failed,
            prefer_tidal_naming,
            windows_safe_names,
            sync_removed,
            retry,
            lyrics,
            api,
        })
    }
}

/// Backoff parameters shared by every retrying client.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 2,
            max_backoff_secs: 30,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LyricsSettings {
    pub enabled: bool,
    /// Whether plain lyrics are an acceptable fallback for missing synced ones.
    pub unsynced: bool,
    /// Concurrent lyric lookups during the backfill pass.
    pub concurrency: usize,
}

impl Default for LyricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            unsynced: false,
            concurrency: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Search/metadata instance candidates, probed for the fastest at startup.
    pub api_instances: Vec<String>,
    /// Streaming instance candidates, probed the same way.
    pub streaming_instances: Vec<String>,
    pub lrclib_url: String,
    pub probe_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_instances: default_instances(&DEFAULT_API_INSTANCES),
            streaming_instances: default_instances(&DEFAULT_STREAMING_INSTANCES),
            lrclib_url: DEFAULT_LRCLIB_URL.to_string(),
            probe_timeout_secs: 5,
        }
    }
}

fn default_instances(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| url.to_string()).collect()
}

/// Parses a logging level string into LoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<LoggingLevel> {
    LoggingLevel::from_str(s, true).ok()
}

/// Parses a quality string into Quality.
fn parse_quality(s: &str) -> Option<Quality> {
    Quality::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("info"),
            Some(LoggingLevel::Info)
        ));
        assert!(matches!(
            parse_logging_level("debug"),
            Some(LoggingLevel::Debug)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("WARN"),
            Some(LoggingLevel::Warn)
        ));
        // Invalid
        assert!(parse_logging_level("verbose").is_none());
    }

    #[test]
    fn test_parse_quality() {
        assert!(matches!(parse_quality("lossless"), Some(Quality::Lossless)));
        assert!(matches!(parse_quality("HIGH"), Some(Quality::High)));
        assert!(matches!(parse_quality("Low"), Some(Quality::Low)));
        assert!(parse_quality("ultra").is_none());
    }

    #[test]
    fn test_quality_param_and_extension() {
        assert_eq!(Quality::Lossless.as_param(), "LOSSLESS");
        assert_eq!(Quality::Lossless.extension(), ".flac");
        assert_eq!(Quality::High.as_param(), "HIGH");
        assert_eq!(Quality::High.extension(), ".m4a");
        assert_eq!(Quality::Low.as_param(), "LOW");
        assert_eq!(Quality::Low.extension(), ".m4a");
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();

        assert_eq!(config.playlist_file, PathBuf::from("playlist.csv"));
        assert_eq!(config.download_root, PathBuf::from("downloads"));
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.logging_level, LoggingLevel::Info);
        assert_eq!(config.quality, Quality::High);
        assert_eq!(config.concurrent_downloads, 3);
        assert!(config.retry_failed);
        assert!(!config.prefer_tidal_naming);
        assert!(config.windows_safe_names);
        assert!(!config.sync_removed);

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff_secs, 2);
        assert_eq!(config.retry.max_backoff_secs, 30);
        assert_eq!(config.retry.backoff_multiplier, 2.0);

        assert!(config.lyrics.enabled);
        assert!(!config.lyrics.unsynced);
        assert_eq!(config.lyrics.concurrency, 5);

        assert_eq!(config.api.api_instances.len(), 2);
        assert_eq!(config.api.streaming_instances.len(), 2);
        assert_eq!(config.api.lrclib_url, "https://lrclib.net/api");
        assert_eq!(config.api.probe_timeout_secs, 5);
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            playlist_file: Some(PathBuf::from("/lists/road-trip.csv")),
            download_dir: Some(PathBuf::from("/music")),
            cache_dir: Some(PathBuf::from("/var/cache/mirror")),
            concurrent_downloads: Some(6),
            quality: Some(Quality::Lossless),
            retry_failed: Some(false),
            sync_removed: Some(true),
            logging_level: Some(LoggingLevel::Debug),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.playlist_file, PathBuf::from("/lists/road-trip.csv"));
        assert_eq!(config.download_root, PathBuf::from("/music"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/mirror"));
        assert_eq!(config.concurrent_downloads, 6);
        assert_eq!(config.quality, Quality::Lossless);
        assert!(!config.retry_failed);
        assert!(config.sync_removed);
        assert_eq!(config.logging_level, LoggingLevel::Debug);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            playlist_file: Some(PathBuf::from("/cli/playlist.csv")),
            quality: Some(Quality::Low),
            concurrent_downloads: Some(2),
            ..Default::default()
        };

        let file_config = FileConfig {
            logging_level: Some("error".to_string()),
            paths: Some(PathsConfig {
                playlist_file: Some("/toml/playlist.csv".to_string()),
                ..Default::default()
            }),
            downloader: Some(DownloaderConfig {
                quality: Some("lossless".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.playlist_file, PathBuf::from("/toml/playlist.csv"));
        assert_eq!(config.quality, Quality::Lossless);
        assert_eq!(config.logging_level, LoggingLevel::Error);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.concurrent_downloads, 2);
    }

    #[test]
    fn test_resolve_zero_workers_error() {
        let cli = CliConfig {
            concurrent_downloads: Some(0),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("concurrent_downloads"));
    }

    #[test]
    fn test_resolve_empty_instances_error() {
        let file_config = FileConfig {
            api: Some(ApiConfig {
                api_instances: Some(vec![]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&CliConfig::default(), Some(file_config));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API instance"));
    }

    #[test]
    fn test_resolve_unknown_logging_level_falls_back() {
        let file_config = FileConfig {
            logging_level: Some("chatty".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&CliConfig::default(), Some(file_config)).unwrap();
        assert_eq!(config.logging_level, LoggingLevel::Info);
    }

    #[test]
    fn test_file_config_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
logging_level = "debug"

[paths]
playlist_file = "mix.csv"

[downloader]
concurrent_downloads = 4
quality = "lossless"
windows_safe_filenames = false
backoff_multiplier = 1.5

[lyrics]
unsynced = true

[api]
api_instances = ["https://api.example.test"]
probe_timeout_secs = 2
"#,
        )
        .unwrap();

        let file = FileConfig::load(&path).unwrap();
        let config = AppConfig::resolve(&CliConfig::default(), Some(file)).unwrap();

        assert_eq!(config.logging_level, LoggingLevel::Debug);
        assert_eq!(config.playlist_file, PathBuf::from("mix.csv"));
        assert_eq!(config.concurrent_downloads, 4);
        assert_eq!(config.quality, Quality::Lossless);
        assert!(!config.windows_safe_names);
        assert_eq!(config.retry.backoff_multiplier, 1.5);
        assert!(config.lyrics.unsynced);
        assert_eq!(
            config.api.api_instances,
            vec!["https://api.example.test".to_string()]
        );
        assert_eq!(config.api.probe_timeout_secs, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.download_root, PathBuf::from("downloads"));
        assert_eq!(config.api.streaming_instances.len(), 2);
    }

    #[test]
    fn test_file_config_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = FileConfig::load(&dir.path().join("nope.toml"));
        assert!(result.is_err());
    }
}
