//! Run orchestration.
//!
//! Walks the playlist sequentially: cached completions are skipped (with a
//! lyrics backfill when the entry still wants one), cached failures are
//! skipped per the retry policy, and the rest resolve against the catalog
//! and feed the download pool. Resolution stays sequential; downloading is
//! the concurrent stage.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, CompletedEntry};
use crate::config::AppConfig;
use crate::downloader::DownloadPool;
use crate::lyrics::{LyricsClient, LyricsRequest};
use crate::playlist::{load_playlist, PlaylistTrack};
use crate::resolver::{ResolveError, Resolver};
use crate::retry::RetryPolicy;
use crate::tagger::Tagger;
use crate::tidal::TidalClient;

/// Counts for the end-of-run report. `completed` and `failed` are cache
/// totals, so they cover earlier runs too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Completed share of the playlist as a percentage.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

pub struct App {
    config: AppConfig,
    resolver: Resolver,
    tagger: Tagger,
    lyrics: LyricsClient,
    cache: Arc<Mutex<CacheStore>>,
    shutdown: CancellationToken,
}

impl App {
    pub fn new(
        config: AppConfig,
        client: TidalClient,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let resolver = Resolver::new(client, &config);
        let tagger = Tagger::new()?;
        let lyrics = LyricsClient::new(&config, RetryPolicy::new(&config.retry))?;
        let cache = Arc::new(Mutex::new(CacheStore::load(&config.cache_dir)?));

        Ok(Self {
            config,
            resolver,
            tagger,
            lyrics,
            cache,
            shutdown,
        })
    }

    /// One full run over the playlist. Always returns a summary, even when
    /// the run was cancelled part-way through.
    pub async fn run(self) -> Result<RunSummary> {
        let tracks = load_playlist(&self.config.playlist_file)?;
        info!(
            "Loaded {} tracks from {}",
            tracks.len(),
            self.config.playlist_file.display()
        );

        let (sender, receiver) = mpsc::unbounded_channel();
        let pool = DownloadPool::spawn(
            &self.config,
            receiver,
            self.tagger.clone(),
            self.lyrics.clone(),
            self.cache.clone(),
            self.shutdown.clone(),
        )?;

        let mut backfills = JoinSet::new();
        let limiter = Arc::new(Semaphore::new(self.config.lyrics.concurrency));

        for track in &tracks {
            if self.shutdown.is_cancelled() {
                break;
            }
            let key = track.full_title();

            let completed = {
                let cache = self.cache.lock().unwrap();
                cache.completed(&key).cloned()
            };
            if let Some(entry) = completed {
                info!(
                    "[{:02}] Skipping download, already downloaded: {}",
                    track.index, key
                );
                if self.config.lyrics.enabled && entry.wants_lyrics_backfill() {
                    self.spawn_backfill(
                        &mut backfills,
                        limiter.clone(),
                        track.index,
                        &key,
                        &entry,
                    );
                }
                continue;
            }

            let previously_failed = {
                let cache = self.cache.lock().unwrap();
                cache.is_failed(&key, self.config.retry_failed)
            };
            if previously_failed {
                info!(
                    "[{:02}] Skipping download, previously failed: {}",
                    track.index, key
                );
                continue;
            }

            info!("[{:02}] Searching for: {}", track.index, key);
            match self.resolver.resolve(track).await {
                Ok(job) => {
                    self.clear_stale_failure(&key);
                    if sender.send(job).is_err() {
                        warn!("download queue closed, stopping resolution");
                        break;
                    }
                }
                Err(ResolveError::NoMatch(report)) => {
                    warn!("[{:02}] No match found for: {}", track.index, key);
                    let mut cache = self.cache.lock().unwrap();
                    if let Err(err) = cache.record_failure_if_absent(&key, report.render()) {
                        error!("failed to persist failed cache: {}", err);
                    }
                }
                Err(err @ ResolveError::RateLimited(_)) => {
                    warn!("[{:02}] {}", track.index, err);
                    let mut cache = self.cache.lock().unwrap();
                    if let Err(cache_err) = cache.record_failure(&key, err.to_string()) {
                        error!("failed to persist failed cache: {}", cache_err);
                    }
                }
            }
        }

        // Backfills settle before the queue closes, so every cache mutation
        // of this run lands before the pool drains out.
        while let Some(result) = backfills.join_next().await {
            if let Err(err) = result {
                error!("lyrics backfill task panicked: {}", err);
            }
        }

        drop(sender);
        pool.join().await;

        if self.config.sync_removed && !self.shutdown.is_cancelled() {
            self.sync_removed_tracks(&tracks);
        }

        if self.shutdown.is_cancelled() {
            info!("Run cancelled; the summary covers work finished before shutdown.");
        }
        Ok(self.summary(tracks.len()))
    }

    /// Schedule a lyrics re-fetch for an already-downloaded track. Tasks run
    /// under their own concurrency bound, independent of the download pool.
    fn spawn_backfill(
        &self,
        tasks: &mut JoinSet<()>,
        limiter: Arc<Semaphore>,
        index: usize,
        full_title: &str,
        entry: &CompletedEntry,
    ) {
        let (request, lrc_path) = LyricsRequest::from_completed(full_title, entry);
        let lyrics = self.lyrics.clone();
        let cache = self.cache.clone();

        tasks.spawn(async move {
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };
            info!(
                "[{:02}] Fetching missing lyrics for: {}",
                index, request.full_title
            );
            match lyrics.fetch_to_file(&request, &lrc_path).await {
                Ok((lyrics_found, unsynced_exists)) => {
                    let mut cache = cache.lock().unwrap();
                    if let Err(err) =
                        cache.update_lyrics(&request.full_title, lyrics_found, unsynced_exists)
                    {
                        error!("failed to persist completed cache: {}", err);
                    }
                }
                Err(err) => warn!(
                    "[{:02}] Lyrics backfill failed for {}: {}",
                    index, request.full_title, err
                ),
            }
        });
    }

    fn clear_stale_failure(&self, full_title: &str) {
        let mut cache = self.cache.lock().unwrap();
        match cache.remove_failure(full_title) {
            Ok(true) => debug!("cleared cached failure for {}", full_title),
            Ok(false) => {}
            Err(err) => error!("failed to persist failed cache: {}", err),
        }
    }

    /// Prune cache entries and files for tracks gone from the playlist.
    fn sync_removed_tracks(&self, tracks: &[PlaylistTrack]) {
        let keep: HashSet<String> = tracks.iter().map(|t| t.full_title()).collect();
        let mut cache = self.cache.lock().unwrap();
        match cache.sync(&keep, &self.config.download_root) {
            Ok(report) => {
                if report.removed_completed > 0 || report.removed_failed > 0 {
                    info!(
                        "Playlist sync removed {} downloaded and {} failed entries",
                        report.removed_completed, report.removed_failed
                    );
                }
            }
            Err(err) => error!("playlist sync failed: {}", err),
        }
    }

    fn summary(&self, total: usize) -> RunSummary {
        let cache = self.cache.lock().unwrap();
        RunSummary {
            total,
            completed: cache.completed_count(),
            failed: cache.failed_count(),
        }
    }
}
