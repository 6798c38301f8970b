//! Synced lyrics lookup against LRCLIB.
//!
//! Runs in two places: right after a fresh download, and as a backfill pass
//! over previously completed tracks whose cache entry says lyrics are still
//! missing. A lookup miss is a normal outcome, not an error; only transport
//! failures surface to the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::CompletedEntry;
use crate::config::AppConfig;
use crate::resolver::ResolvedJob;
use crate::retry::{RetryPolicy, Retryable};
use crate::tidal::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 10;

// =========================================================================
// Errors
// =========================================================================

#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("lyrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write lyrics file: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for LyricsError {
    fn is_retryable(&self) -> bool {
        matches!(self, LyricsError::Http(_))
    }
}

// =========================================================================
// Wire Types
// =========================================================================

/// One LRCLIB record. Either lyrics field may be null, absent or empty;
/// a missing record deserializes to the all-`None` default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LrclibRecord {
    #[serde(default, rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,

    #[serde(default, rename = "plainLyrics")]
    pub plain_lyrics: Option<String>,
}

// =========================================================================
// Request
// =========================================================================

/// Lookup parameters for one track. Always built from catalog-side naming,
/// never from the source playlist's naming.
#[derive(Debug, Clone)]
pub struct LyricsRequest {
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// Track length in seconds; LRCLIB matches on it.
    pub duration: u32,
    /// Cache key of the track, used only in log lines.
    pub full_title: String,
}

impl LyricsRequest {
    /// Build a request for a freshly downloaded job.
    pub fn from_job(job: &ResolvedJob) -> Self {
        Self {
            track_name: job.tidal_title.clone(),
            artist_name: job.tidal_artists.clone(),
            album_name: job.tidal_album.clone(),
            duration: job.duration,
            full_title: job.full_title.clone(),
        }
    }

    /// Build a backfill request from a cached download, along with the path
    /// the lyrics file belongs at: the audio path with an `.lrc` extension.
    pub fn from_completed(full_title: &str, entry: &CompletedEntry) -> (Self, PathBuf) {
        let lrc_path = Path::new(&entry.path).with_extension("lrc");
        let request = Self {
            track_name: entry.tidal_title.clone(),
            artist_name: entry.tidal_artists.clone(),
            album_name: entry.tidal_album.clone(),
            duration: entry.duration,
            full_title: full_title.to_string(),
        };
        (request, lrc_path)
    }
}

// =========================================================================
// Client
// =========================================================================

/// LRCLIB client. Cheap to clone; backfill tasks and download workers each
/// hold their own copy.
#[derive(Clone)]
pub struct LyricsClient {
    client: Client,
    base_url: String,
    enabled: bool,
    download_unsynced: bool,
    retry: RetryPolicy,
}

impl LyricsClient {
    pub fn new(config: &AppConfig, retry: RetryPolicy) -> Result<Self, LyricsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api.lrclib_url.trim_end_matches('/').to_string(),
            enabled: config.lyrics.enabled,
            download_unsynced: config.lyrics.unsynced,
            retry,
        })
    }

    /// Look up lyrics for one track and write them next to the audio file.
    ///
    /// Returns `(found, unsynced_exists)`: `found` says whether a lyrics
    /// file was written, `unsynced_exists` whether the service has a plain
    /// fallback for this track (`None` when lyrics are disabled and the
    /// service was never asked).
    pub async fn fetch_to_file(
        &self,
        request: &LyricsRequest,
        lrc_path: &Path,
    ) -> Result<(bool, Option<bool>), LyricsError> {
        if !self.enabled {
            return Ok((false, None));
        }

        let record = self.lookup(request).await?;
        match choose_lyrics(&record, self.download_unsynced) {
            (Some(text), unsynced_exists) => {
                std::fs::write(lrc_path, text)?;
                info!("Lyrics downloaded for: {}", request.full_title);
                Ok((true, unsynced_exists))
            }
            (None, unsynced_exists) => {
                if self.download_unsynced {
                    info!("No lyrics found for: {}", request.full_title);
                } else {
                    info!("No synced lyrics found for: {}", request.full_title);
                }
                Ok((false, unsynced_exists))
            }
        }
    }

    async fn lookup(&self, request: &LyricsRequest) -> Result<LrclibRecord, LyricsError> {
        let mut retry_count = 0;
        loop {
            match self.fetch_record(request).await {
                Ok(record) => return Ok(record),
                Err(err) if self.retry.should_retry(&err, retry_count) => {
                    let delay = self.retry.backoff(retry_count);
                    retry_count += 1;
                    warn!(
                        "lyrics lookup failed (attempt {}): {}; retrying in {:?}",
                        retry_count, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_record(&self, request: &LyricsRequest) -> Result<LrclibRecord, LyricsError> {
        let url = format!("{}/get", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("track_name", request.track_name.as_str()),
                ("artist_name", request.artist_name.as_str()),
                ("album_name", request.album_name.as_str()),
            ])
            .query(&[("duration", request.duration)])
            .send()
            .await?;

        // 404 just means no record for this signature. Other failure codes
        // are logged and treated the same; the job must not fail over them.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(LrclibRecord::default());
        }
        if !response.status().is_success() {
            warn!(
                "lyrics service returned {} for '{}'",
                response.status(),
                request.full_title
            );
            return Ok(LrclibRecord::default());
        }

        Ok(response.json().await?)
    }
}

/// Pick the lyrics text to write, if any, and the resulting
/// `unsynced_exists` flag. Empty strings count as absent for writing, but
/// a present-and-empty plain field still proves the record exists.
fn choose_lyrics(record: &LrclibRecord, want_unsynced: bool) -> (Option<String>, Option<bool>) {
    let synced = record
        .synced_lyrics
        .clone()
        .filter(|text| !text.is_empty());
    if let Some(text) = synced {
        return (Some(text), Some(true));
    }

    let plain = record.plain_lyrics.clone().filter(|text| !text.is_empty());
    if want_unsynced {
        match plain {
            Some(text) => (Some(text), Some(true)),
            None => (None, Some(false)),
        }
    } else {
        (None, Some(record.plain_lyrics.is_some()))
    }
}
