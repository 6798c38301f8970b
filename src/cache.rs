//! Persistent completed/failed download state.
//!
//! Two JSON documents under the cache directory, keyed by the canonical
//! "Artist - Title" string: `completed.json` maps to [`CompletedEntry`],
//! `failed.json` to [`FailedEntry`]. Every mutating method rewrites the
//! affected document wholesale before returning, so the on-disk state is
//! never more than one mutation behind memory. The two maps are kept
//! mutually exclusive per key: recording a completion removes any failure.
//!
//! The JSON field names are the historical cache format; changing them
//! invalidates caches from earlier versions.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::paths::prune_empty_dirs;

const COMPLETED_FILE: &str = "completed.json";
const FAILED_FILE: &str = "failed.json";

/// Failure reasons starting with this prefix are re-attempted on every run,
/// regardless of the retry-failed policy: the upstream was throttling, not
/// reporting a real mismatch.
pub const RATE_LIMITED_PREFIX: &str = "Rate limited";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A successfully downloaded track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedEntry {
    /// Absolute or root-relative path of the audio file on disk.
    pub path: String,
    /// Whether a lyrics file was written.
    #[serde(rename = "lyrics")]
    pub lyrics_found: bool,
    /// Whether unsynced lyrics exist upstream; `None` means never probed.
    pub unsynced_exists: Option<bool>,
    pub tidal_title: String,
    pub tidal_artists: String,
    pub tidal_album: String,
    /// Track length in seconds, used for lyrics lookups.
    pub duration: u32,
}

impl CompletedEntry {
    /// Whether a later run should retry fetching lyrics for this track:
    /// none were written yet, and the service has not already said that
    /// nothing is available.
    pub fn wants_lyrics_backfill(&self) -> bool {
        !self.lyrics_found && self.unsynced_exists != Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub reason: String,
}

/// Counts reported by [`CacheStore::sync`].
#[derive(Debug, Default, PartialEq)]
pub struct SyncReport {
    pub removed_completed: usize,
    pub removed_failed: usize,
}

pub struct CacheStore {
    completed_path: PathBuf,
    failed_path: PathBuf,
    completed: BTreeMap<String, CompletedEntry>,
    failed: BTreeMap<String, FailedEntry>,
}

impl CacheStore {
    /// Loads both documents from `cache_dir`, creating the directory if
    /// needed. Missing documents start as empty maps.
    pub fn load(cache_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir)?;
        let completed_path = cache_dir.join(COMPLETED_FILE);
        let failed_path = cache_dir.join(FAILED_FILE);
        Ok(Self {
            completed: load_document(&completed_path)?,
            failed: load_document(&failed_path)?,
            completed_path,
            failed_path,
        })
    }

    pub fn is_downloaded(&self, full_title: &str) -> bool {
        self.completed.contains_key(full_title)
    }

    pub fn completed(&self, full_title: &str) -> Option<&CompletedEntry> {
        self.completed.get(full_title)
    }

    /// Whether a cached failure should make us skip this track. Rate-limited
    /// failures never count: a retry is likely to succeed.
    pub fn is_failed(&self, full_title: &str, retry_failed: bool) -> bool {
        if retry_failed {
            return false;
        }
        match self.failed.get(full_title) {
            Some(entry) => !entry.reason.starts_with(RATE_LIMITED_PREFIX),
            None => false,
        }
    }

    pub fn failure_reason(&self, full_title: &str) -> Option<&str> {
        self.failed.get(full_title).map(|e| e.reason.as_str())
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Records a completed download and drops any stale failure for the key.
    pub fn record_completed(
        &mut self,
        full_title: &str,
        entry: CompletedEntry,
    ) -> Result<(), CacheError> {
        self.completed.insert(full_title.to_string(), entry);
        if self.failed.remove(full_title).is_some() {
            self.persist_failed()?;
        }
        self.persist_completed()
    }

    /// Records a failure, overwriting any previous reason for the key.
    pub fn record_failure(&mut self, full_title: &str, reason: String) -> Result<(), CacheError> {
        self.failed.insert(full_title.to_string(), FailedEntry { reason });
        self.persist_failed()
    }

    /// Records a failure only when the key has none yet: the first reason
    /// observed for a track wins across runs.
    pub fn record_failure_if_absent(
        &mut self,
        full_title: &str,
        reason: String,
    ) -> Result<(), CacheError> {
        if self.failed.contains_key(full_title) {
            return Ok(());
        }
        self.record_failure(full_title, reason)
    }

    /// Clears a cached failure after a successful resolution. Returns whether
    /// an entry was present.
    pub fn remove_failure(&mut self, full_title: &str) -> Result<bool, CacheError> {
        if self.failed.remove(full_title).is_some() {
            self.persist_failed()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Updates the lyrics flags of a completed entry (backfill outcome).
    pub fn update_lyrics(
        &mut self,
        full_title: &str,
        lyrics_found: bool,
        unsynced_exists: Option<bool>,
    ) -> Result<(), CacheError> {
        if let Some(entry) = self.completed.get_mut(full_title) {
            entry.lyrics_found = lyrics_found;
            entry.unsynced_exists = unsynced_exists;
            self.persist_completed()?;
        }
        Ok(())
    }

    /// Prunes cache entries (and, for completed ones, their files) for tracks
    /// no longer present in the playlist. `keep` is the set of current
    /// `full_title` keys; `download_root` bounds directory pruning.
    /// Idempotent: a second run with the same playlist removes nothing.
    pub fn sync(
        &mut self,
        keep: &HashSet<String>,
        download_root: &Path,
    ) -> Result<SyncReport, CacheError> {
        let mut report = SyncReport::default();

        let stale: Vec<String> = self
            .completed
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(entry) = self.completed.remove(&key) {
                remove_track_files(&entry.path, download_root);
                debug!("pruned cached track: {}", key);
                report.removed_completed += 1;
            }
        }

        let stale: Vec<String> = self
            .failed
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            self.failed.remove(&key);
            report.removed_failed += 1;
        }

        if report.removed_completed > 0 {
            self.persist_completed()?;
        }
        if report.removed_failed > 0 {
            self.persist_failed()?;
        }
        Ok(report)
    }

    fn persist_completed(&self) -> Result<(), CacheError> {
        write_document(&self.completed_path, &self.completed)
    }

    fn persist_failed(&self) -> Result<(), CacheError> {
        write_document(&self.failed_path, &self.failed)
    }
}

fn load_document<T: for<'de> Deserialize<'de>>(
    path: &Path,
) -> Result<BTreeMap<String, T>, CacheError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_document<T: Serialize>(path: &Path, map: &BTreeMap<String, T>) -> Result<(), CacheError> {
    let content = serde_json::to_string_pretty(map)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Deletes a pruned track's audio file and its sibling lyrics file, then
/// removes directories the deletion emptied. Missing files are fine.
fn remove_track_files(audio_path: &str, download_root: &Path) {
    let audio = PathBuf::from(audio_path);
    let _ = std::fs::remove_file(&audio);
    let _ = std::fs::remove_file(audio.with_extension("lrc"));
    if let Some(parent) = audio.parent() {
        prune_empty_dirs(parent, download_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str) -> CompletedEntry {
        CompletedEntry {
            path: path.to_string(),
            lyrics_found: true,
            unsynced_exists: Some(true),
            tidal_title: "Title".to_string(),
            tidal_artists: "Artist".to_string(),
            tidal_album: "Album".to_string(),
            duration: 215,
        }
    }

    #[test]
    fn test_load_empty_cache() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path()).unwrap();
        assert_eq!(store.completed_count(), 0);
        assert_eq!(store.failed_count(), 0);
    }

    #[test]
    fn test_wants_lyrics_backfill() {
        let mut entry = entry("Title.m4a");
        // Lyrics already on disk.
        assert!(!entry.wants_lyrics_backfill());

        entry.lyrics_found = false;
        entry.unsynced_exists = None;
        // Never probed.
        assert!(entry.wants_lyrics_backfill());

        entry.unsynced_exists = Some(true);
        // Fallback known to exist upstream.
        assert!(entry.wants_lyrics_backfill());

        entry.unsynced_exists = Some(false);
        // Known absent; asking again is pointless.
        assert!(!entry.wants_lyrics_backfill());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CacheStore::load(dir.path()).unwrap();
            store
                .record_completed("Artist - Title", entry("/music/a/b/Title.flac"))
                .unwrap();
            store
                .record_failure("Artist - Other", "No results found.".to_string())
                .unwrap();
        }
        let store = CacheStore::load(dir.path()).unwrap();
        assert!(store.is_downloaded("Artist - Title"));
        assert_eq!(
            store.completed("Artist - Title").unwrap(),
            &entry("/music/a/b/Title.flac")
        );
        assert_eq!(
            store.failure_reason("Artist - Other"),
            Some("No results found.")
        );
    }

    #[test]
    fn test_historical_document_format() {
        // Field names on disk are fixed by caches written before this
        // version existed.
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("completed.json"),
            r#"{
                "Artist - Title": {
                    "path": "downloads/Artist/Album/Title.m4a",
                    "lyrics": false,
                    "unsynced_exists": null,
                    "tidal_title": "Title",
                    "tidal_artists": "Artist",
                    "tidal_album": "Album",
                    "duration": 180
                }
            }"#,
        )
        .unwrap();

        let store = CacheStore::load(dir.path()).unwrap();
        let entry = store.completed("Artist - Title").unwrap();
        assert!(!entry.lyrics_found);
        assert_eq!(entry.unsynced_exists, None);
        assert_eq!(entry.duration, 180);

        // And they stay fixed when written back.
        let mut store = store;
        store
            .record_completed("Other - Key", self::entry("x.flac"))
            .unwrap();
        let raw = std::fs::read_to_string(dir.path().join("completed.json")).unwrap();
        assert!(raw.contains("\"lyrics\""));
        assert!(raw.contains("\"unsynced_exists\""));
        assert!(!raw.contains("lyrics_found"));
    }

    #[test]
    fn test_completion_clears_failure() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::load(dir.path()).unwrap();
        store
            .record_failure("Artist - Title", "Title mismatch".to_string())
            .unwrap();
        store
            .record_completed("Artist - Title", entry("t.flac"))
            .unwrap();
        assert!(store.is_downloaded("Artist - Title"));
        assert!(store.failure_reason("Artist - Title").is_none());

        let reloaded = CacheStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.failed_count(), 0);
    }

    #[test]
    fn test_first_failure_reason_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::load(dir.path()).unwrap();
        store
            .record_failure_if_absent("Artist - Title", "first".to_string())
            .unwrap();
        store
            .record_failure_if_absent("Artist - Title", "second".to_string())
            .unwrap();
        assert_eq!(store.failure_reason("Artist - Title"), Some("first"));
    }

    #[test]
    fn test_is_failed_policies() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::load(dir.path()).unwrap();
        store
            .record_failure("Artist - A", "Title mismatch".to_string())
            .unwrap();
        store
            .record_failure(
                "Artist - B",
                format!("{} while fetching album metadata", RATE_LIMITED_PREFIX),
            )
            .unwrap();

        assert!(store.is_failed("Artist - A", false));
        // retry_failed bypasses everything.
        assert!(!store.is_failed("Artist - A", true));
        // Rate-limited failures are always retried.
        assert!(!store.is_failed("Artist - B", false));
        assert!(!store.is_failed("Artist - Unknown", false));
    }

    #[test]
    fn test_update_lyrics() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::load(dir.path()).unwrap();
        let mut e = entry("t.flac");
        e.lyrics_found = false;
        e.unsynced_exists = None;
        store.record_completed("Artist - Title", e).unwrap();

        store
            .update_lyrics("Artist - Title", true, Some(true))
            .unwrap();
        let reloaded = CacheStore::load(dir.path()).unwrap();
        let entry = reloaded.completed("Artist - Title").unwrap();
        assert!(entry.lyrics_found);
        assert_eq!(entry.unsynced_exists, Some(true));
    }

    #[test]
    fn test_sync_prunes_stale_entries_and_files() {
        let root = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let track_dir = root.path().join("Artist").join("Album");
        std::fs::create_dir_all(&track_dir).unwrap();
        let audio = track_dir.join("Gone.flac");
        std::fs::write(&audio, b"audio").unwrap();
        std::fs::write(track_dir.join("Gone.lrc"), b"lyrics").unwrap();

        let mut store = CacheStore::load(cache_dir.path()).unwrap();
        store
            .record_completed("Artist - Gone", entry(&audio.display().to_string()))
            .unwrap();
        store
            .record_completed("Artist - Kept", entry("irrelevant.flac"))
            .unwrap();
        store
            .record_failure("Artist - Stale Failure", "reason".to_string())
            .unwrap();

        let keep: HashSet<String> = ["Artist - Kept".to_string()].into_iter().collect();
        let report = store.sync(&keep, root.path()).unwrap();

        assert_eq!(report.removed_completed, 1);
        assert_eq!(report.removed_failed, 1);
        assert!(store.is_downloaded("Artist - Kept"));
        assert!(!store.is_downloaded("Artist - Gone"));
        assert!(!audio.exists());
        assert!(!track_dir.exists());
        // Emptied ancestors go too, the root stays.
        assert!(!root.path().join("Artist").exists());
        assert!(root.path().exists());

        // Idempotent: nothing left to remove.
        let report = store.sync(&keep, root.path()).unwrap();
        assert_eq!(report, SyncReport::default());
    }
}
