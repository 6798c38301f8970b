//! HTTP client for the catalog service instances.
//!
//! Talks to two hosts: a search/metadata instance and a streaming instance
//! that hands out asset URLs wrapped in base64 manifests. Every call goes
//! through the shared retry policy before its error surfaces to the caller.

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
    AlbumInfo, AlbumResponse, PlaybackResponse, SearchResponse, StreamManifest, TidalTrack,
};
use crate::config::Quality;
use crate::retry::{RetryPolicy, Retryable};

/// Browser-like user agent sent to all instances. Some mirrors reject the
/// default reqwest one.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Marker found in upstream error bodies when an instance is throttling us.
const RATE_LIMIT_BODY_MARKER: &str = "too many requests";

/// Errors from the catalog service.
#[derive(Debug, Error)]
pub enum TidalError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Retryable for TidalError {
    fn is_retryable(&self) -> bool {
        match self {
            TidalError::Http(_) | TidalError::RateLimited => true,
            TidalError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            TidalError::Malformed(_) => false,
        }
    }
}

/// Client for the catalog search, playback and album endpoints.
#[derive(Clone)]
pub struct TidalClient {
    client: Client,
    api_base: String,
    stream_base: String,
    quality: Quality,
    retry: RetryPolicy,
}

impl TidalClient {
    /// Create a new TidalClient.
    ///
    /// # Arguments
    /// * `api_base` - Base URL of the search/metadata instance
    /// * `stream_base` - Base URL of the streaming instance
    /// * `quality` - Audio quality requested for playback lookups
    /// * `retry` - Retry policy applied to every request
    /// * `timeout_secs` - Request timeout in seconds
    pub fn new(
        api_base: String,
        stream_base: String,
        quality: Quality,
        retry: RetryPolicy,
        timeout_secs: u64,
    ) -> Result<Self, TidalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_base,
            stream_base,
            quality,
            retry,
        })
    }

    /// Get the base URL of the search/metadata instance.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the base URL of the streaming instance.
    pub fn stream_base(&self) -> &str {
        &self.stream_base
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search the catalog for tracks matching a free-text query.
    pub async fn search(&self, query: &str) -> Result<Vec<TidalTrack>, TidalError> {
        self.with_retry("search", || self.fetch_search(query)).await
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<TidalTrack>, TidalError> {
        let url = format!(
            "{}/search/?s={}",
            self.api_base,
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TidalError::Status { status, url });
        }

        let search: SearchResponse = response.json().await?;
        Ok(search.data.items)
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Resolve the direct asset URL for a track at the configured quality.
    ///
    /// Returns `Ok(None)` when the instance has no stream for this track;
    /// that is a valid response, not an error.
    pub async fn stream_url(&self, track_id: u64) -> Result<Option<String>, TidalError> {
        self.with_retry("playback lookup", || self.fetch_stream_url(track_id))
            .await
    }

    async fn fetch_stream_url(&self, track_id: u64) -> Result<Option<String>, TidalError> {
        let url = format!(
            "{}/track/?id={}&quality={}",
            self.stream_base,
            track_id,
            self.quality.as_param()
        );
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TidalError::Status { status, url });
        }

        let playback: PlaybackResponse = response.json().await?;
        let data = match playback.data {
            Some(data) => data,
            None => return Ok(None),
        };

        let manifest = decode_manifest(&data.manifest)?;
        Ok(manifest.urls.into_iter().next())
    }

    // =========================================================================
    // Album Metadata
    // =========================================================================

    /// Fetch supplementary album metadata (track count, release date).
    ///
    /// The album endpoint is the one most aggressively throttled upstream;
    /// throttled responses sometimes arrive as a 200 with an error body, so
    /// the body is inspected before parsing.
    pub async fn album(&self, album_id: u64) -> Result<AlbumInfo, TidalError> {
        self.with_retry("album lookup", || self.fetch_album(album_id))
            .await
    }

    async fn fetch_album(&self, album_id: u64) -> Result<AlbumInfo, TidalError> {
        let url = format!("{}/album/?id={}", self.api_base, album_id);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TidalError::RateLimited);
        }
        if !status.is_success() {
            return Err(TidalError::Status { status, url });
        }

        let body = response.text().await?;
        if is_rate_limited_body(&body) {
            return Err(TidalError::RateLimited);
        }

        let album: AlbumResponse = serde_json::from_str(&body)
            .map_err(|e| TidalError::Malformed(format!("album response: {}", e)))?;
        Ok(album.data)
    }

    // =========================================================================
    // Retry Wrapper
    // =========================================================================

    async fn with_retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, TidalError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, TidalError>>,
    {
        let mut retry_count = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.retry.should_retry(&err, retry_count) => {
                    let delay = self.retry.backoff(retry_count);
                    retry_count += 1;
                    warn!(
                        "{} failed (attempt {}): {}; retrying in {:?}",
                        what, retry_count, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Decode the base64 playback manifest into its JSON payload.
fn decode_manifest(manifest_b64: &str) -> Result<StreamManifest, TidalError> {
    let raw = BASE64
        .decode(manifest_b64)
        .map_err(|e| TidalError::Malformed(format!("manifest base64: {}", e)))?;
    serde_json::from_slice(&raw).map_err(|e| TidalError::Malformed(format!("manifest json: {}", e)))
}

/// Check whether a response body carries the upstream throttling marker.
fn is_rate_limited_body(body: &str) -> bool {
    body.to_lowercase().contains(RATE_LIMIT_BODY_MARKER)
}

/// Probe a list of instance base URLs and return the fastest responder.
///
/// Instances that fail to answer with a success status within the timeout
/// are skipped. Returns None when no instance is reachable.
pub async fn probe_fastest(urls: &[String], timeout: Duration) -> Option<String> {
    let client = match Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!("failed to build probe client: {}", err);
            return None;
        }
    };

    let mut fastest: Option<(String, Duration)> = None;
    for url in urls {
        let started = Instant::now();
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let elapsed = started.elapsed();
                debug!("instance {} answered in {:?}", url, elapsed);
                if fastest.as_ref().map_or(true, |(_, best)| elapsed < *best) {
                    fastest = Some((url.clone(), elapsed));
                }
            }
            Ok(response) => {
                debug!("instance {} returned status {}", url, response.status());
            }
            Err(err) => {
                debug!("instance {} unreachable: {}", url, err);
            }
        }
    }

    fastest.map(|(url, _)| url)
}
