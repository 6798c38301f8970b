use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub logging_level: Option<String>,

    // Section configs
    pub paths: Option<PathsConfig>,
    pub downloader: Option<DownloaderConfig>,
    pub lyrics: Option<LyricsConfig>,
    pub api: Option<ApiConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub playlist_file: Option<String>,
    pub download_dir: Option<String>,
    pub cache_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloaderConfig {
    pub concurrent_downloads: Option<usize>,
    pub quality: Option<String>,
    pub retry_failed: Option<bool>,
    pub prefer_tidal_naming: Option<bool>,
    pub windows_safe_filenames: Option<bool>,
    pub sync_removed: Option<bool>,
    pub max_retries: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LyricsConfig {
    pub enabled: Option<bool>,
    pub unsynced: Option<bool>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub api_instances: Option<Vec<String>>,
    pub streaming_instances: Option<Vec<String>>,
    pub lrclib_url: Option<String>,
    pub probe_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
