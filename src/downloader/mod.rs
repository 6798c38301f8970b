//! Concurrent download pipeline.
//!
//! A fixed pool of workers drains resolved jobs from a FIFO queue, streams
//! each asset to disk with retries, then runs tagging and lyrics lookup
//! before the job is recorded in the cache. The queue is an unbounded mpsc
//! channel whose single receiver is shared behind an async mutex; workers
//! exit when the channel is closed and drained, or when the shutdown token
//! fires. A cancelled worker deletes the partial file it was writing.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, CompletedEntry};
use crate::config::AppConfig;
use crate::lyrics::{LyricsClient, LyricsRequest};
use crate::paths::safe_file_name;
use crate::resolver::ResolvedJob;
use crate::retry::{RetryPolicy, Retryable};
use crate::tagger::Tagger;
use crate::tidal::USER_AGENT;

const CONNECT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transfer failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("asset returned {status}")]
    Status { status: StatusCode },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http(_) => true,
            DownloadError::Status { status } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            DownloadError::Io(_) => false,
        }
    }
}

/// Result of one byte-transfer attempt.
enum Transfer {
    Complete,
    Cancelled,
}

/// Handle over the spawned worker tasks.
pub struct DownloadPool {
    handles: Vec<JoinHandle<()>>,
}

impl DownloadPool {
    /// Spawn `concurrent_downloads` workers over the job queue.
    pub fn spawn(
        config: &AppConfig,
        receiver: UnboundedReceiver<ResolvedJob>,
        tagger: Tagger,
        lyrics: LyricsClient,
        cache: Arc<Mutex<CacheStore>>,
        shutdown: CancellationToken,
    ) -> Result<Self, DownloadError> {
        // Audio transfers can legitimately run for minutes, so the client
        // carries a connect timeout but no total deadline.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        let queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let worker = Worker {
            client,
            tagger,
            lyrics,
            cache,
            retry: RetryPolicy::new(&config.retry),
            windows_safe_names: config.windows_safe_names,
        };

        let handles = (0..config.concurrent_downloads)
            .map(|worker_id| {
                let queue = queue.clone();
                let worker = worker.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(worker_id, queue, shutdown).await })
            })
            .collect();

        Ok(Self { handles })
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!("download worker panicked: {}", err);
            }
        }
    }
}

#[derive(Clone)]
struct Worker {
    client: Client,
    tagger: Tagger,
    lyrics: LyricsClient,
    cache: Arc<Mutex<CacheStore>>,
    retry: RetryPolicy,
    windows_safe_names: bool,
}

impl Worker {
    async fn run(
        &self,
        worker_id: usize,
        queue: Arc<tokio::sync::Mutex<UnboundedReceiver<ResolvedJob>>>,
        shutdown: CancellationToken,
    ) {
        loop {
            // The receiver lock is held only while dequeuing, never across
            // a job, so one slow transfer cannot starve the other workers.
            let job = {
                let mut receiver = queue.lock().await;
                tokio::select! {
                    job = receiver.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                    _ = shutdown.cancelled() => break,
                }
            };
            self.process(job, &shutdown).await;
        }
        debug!("download worker {} exiting", worker_id);
    }

    async fn process(&self, job: ResolvedJob, shutdown: &CancellationToken) {
        if let Err(err) = tokio::fs::create_dir_all(&job.download_path).await {
            error!(
                "[{:02}] Failed to create {}: {}",
                job.index,
                job.download_path.display(),
                err
            );
            self.record_failure(&job, err.to_string());
            return;
        }

        let file_name = format!(
            "{}{}",
            safe_file_name(&job.title, self.windows_safe_names),
            job.extension
        );
        let audio_path = job.download_path.join(file_name);

        match self.download(&job, &audio_path, shutdown).await {
            Ok(Transfer::Complete) => {}
            Ok(Transfer::Cancelled) => {
                remove_partial(&audio_path).await;
                info!("[{:02}] Cancelled, removed partial file", job.index);
                return;
            }
            Err(err) => {
                remove_partial(&audio_path).await;
                error!("[{:02}] Failed to download {}: {}", job.index, job.title, err);
                self.record_failure(&job, err.to_string());
                return;
            }
        }

        match self.finish(&job, &audio_path).await {
            Ok(entry) => {
                info!("[{:02}] Downloaded: {}", job.index, job.full_title);
                self.record_completed(&job, entry);
            }
            Err(err) => {
                error!("[{:02}] Failed to process {}: {}", job.index, job.title, err);
                self.record_failure(&job, format!("Post-download processing failed: {}", err));
            }
        }
    }

    /// Stream the asset with bounded retries. Every attempt rewrites the
    /// file from scratch.
    async fn download(
        &self,
        job: &ResolvedJob,
        audio_path: &Path,
        shutdown: &CancellationToken,
    ) -> Result<Transfer, DownloadError> {
        let mut retry_count = 0;
        loop {
            match self.stream_to_file(&job.url, audio_path, shutdown).await {
                Ok(transfer) => return Ok(transfer),
                Err(err) if self.retry.should_retry(&err, retry_count) => {
                    let delay = self.retry.backoff(retry_count);
                    retry_count += 1;
                    warn!(
                        "[{:02}] download attempt {} failed: {}; retrying in {:?}",
                        job.index, retry_count, err, delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => return Ok(Transfer::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        path: &Path,
        shutdown: &CancellationToken,
    ) -> Result<Transfer, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status { status });
        }

        let mut stream = response.bytes_stream();
        let mut file = File::create(path).await?;
        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => file.write_all(&bytes).await?,
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
                _ = shutdown.cancelled() => return Ok(Transfer::Cancelled),
            }
        }
        file.flush().await?;
        Ok(Transfer::Complete)
    }

    /// Tag the file and fetch lyrics, producing the cache entry. Any error
    /// here is a post-download failure; the audio file stays on disk.
    async fn finish(&self, job: &ResolvedJob, audio_path: &Path) -> anyhow::Result<CompletedEntry> {
        self.tagger.tag(job, audio_path).await?;

        let request = LyricsRequest::from_job(job);
        let lrc_path = audio_path.with_extension("lrc");
        let (lyrics_found, unsynced_exists) = self.lyrics.fetch_to_file(&request, &lrc_path).await?;

        Ok(CompletedEntry {
            path: audio_path.display().to_string(),
            lyrics_found,
            unsynced_exists,
            tidal_title: job.tidal_title.clone(),
            tidal_artists: job.tidal_artists.clone(),
            tidal_album: job.tidal_album.clone(),
            duration: job.duration,
        })
    }

    fn record_completed(&self, job: &ResolvedJob, entry: CompletedEntry) {
        let mut cache = self.cache.lock().unwrap();
        if let Err(err) = cache.record_completed(&job.full_title, entry) {
            error!("failed to persist completed cache: {}", err);
        }
    }

    fn record_failure(&self, job: &ResolvedJob, reason: String) {
        let mut cache = self.cache.lock().unwrap();
        if let Err(err) = cache.record_failure(&job.full_title, reason) {
            error!("failed to persist failed cache: {}", err);
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove partial file {}: {}", path.display(), err);
        }
    }
}
