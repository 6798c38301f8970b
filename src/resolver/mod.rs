//! Track resolution
//!
//! Takes one playlist track at a time, runs the generated search queries
//! against the catalog and applies the match cascade to each result page.
//! An accepted candidate is completed into a [`ResolvedJob`] by fetching
//! its asset URL and supplementary album metadata.

mod queries;

pub use queries::search_queries;

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::matching::{compare, is_single, is_song_edit, Field, MatchKind};
use crate::paths::download_dir;
use crate::playlist::PlaylistTrack;
use crate::tidal::{AlbumInfo, TidalClient, TidalTrack};

/// A fully resolved download: everything a worker needs to fetch, tag and
/// cache one track. Owned exclusively by the queue and the worker that
/// dequeues it.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    /// Direct URL of the audio asset.
    pub url: String,
    /// Title used for the file name and tags.
    pub title: String,
    /// Artist used for the directory layout and tags.
    pub artist: String,
    /// Album used for the directory layout and tags.
    pub album: String,
    /// Cover art identifier, when the album carries one.
    pub cover_id: Option<String>,
    pub track_number: u32,
    pub number_of_tracks: u32,
    /// Release date, ISO-8601; empty when unknown.
    pub release_date: String,
    /// Track length in seconds.
    pub duration: u32,
    /// File extension including the dot, fixed by the configured quality.
    pub extension: String,
    /// Catalog-side naming, kept for lyrics lookups and the cache entry.
    pub tidal_title: String,
    pub tidal_artists: String,
    pub tidal_album: String,
    /// Directory the audio file lands in.
    pub download_path: PathBuf,
    /// Cache key of the source track.
    pub full_title: String,
    /// Playlist position, for log prefixes only.
    pub index: usize,
}

/// Comparison context carried out of the match cascade: the last candidate
/// examined before resolution gave up.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub reason: String,
    pub compared: Option<ComparedFields>,
}

/// The (source, found) string pairs of the last comparison.
#[derive(Debug, Clone, Default)]
pub struct ComparedFields {
    pub title: (String, String),
    pub artists: (String, String),
    pub album: (String, String),
}

impl MatchReport {
    fn no_results() -> Self {
        Self {
            reason: "No results found.".to_string(),
            compared: None,
        }
    }

    /// Render the report as a single cache-able reason string.
    pub fn render(&self) -> String {
        match &self.compared {
            Some(c) => format!(
                "{} | title: '{}' vs '{}' | artists: '{}' vs '{}' | album: '{}' vs '{}'",
                self.reason,
                c.title.0,
                c.title.1,
                c.artists.0,
                c.artists.1,
                c.album.0,
                c.album.1
            ),
            None => self.reason.clone(),
        }
    }
}

/// Terminal resolution failures. Transient search errors never surface
/// here; they only skip to the next query.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// All queries exhausted without an acceptable candidate.
    #[error("{}", .0.render())]
    NoMatch(MatchReport),

    /// Album metadata could not be fetched. The rendered message starts
    /// with the prefix the cache treats as always-retryable.
    #[error("Rate limited: {0}")]
    RateLimited(String),
}

/// Resolves playlist tracks against the catalog.
pub struct Resolver {
    client: TidalClient,
    download_root: PathBuf,
    windows_safe_names: bool,
    prefer_tidal_naming: bool,
    extension: String,
}

impl Resolver {
    pub fn new(client: TidalClient, config: &AppConfig) -> Self {
        Self {
            client,
            download_root: config.download_root.clone(),
            windows_safe_names: config.windows_safe_names,
            prefer_tidal_naming: config.prefer_tidal_naming,
            extension: config.quality.extension().to_string(),
        }
    }

    /// Resolve one playlist track into a download job.
    ///
    /// Queries run in order; within a query the first candidate surviving
    /// the cascade wins. A candidate whose asset URL cannot be resolved
    /// fails the query, not the whole resolution.
    pub async fn resolve(&self, track: &PlaylistTrack) -> Result<ResolvedJob, ResolveError> {
        let mut last_report = MatchReport::no_results();

        for query in search_queries(track) {
            debug!("searching for query '{}'", query);
            let candidates = match self.client.search(&query).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    info!("no results for query '{}': {}", query, err);
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }

            let candidate = match pick_candidate(track, &candidates) {
                Selection::Matched(candidate) => candidate,
                Selection::NoMatch(report) => {
                    last_report = report;
                    continue;
                }
            };

            match self.complete(track, candidate).await? {
                Some(job) => {
                    info!(
                        "[{:02}] Found: {} by {}",
                        track.index,
                        candidate.display_title(),
                        candidate.primary_artist()
                    );
                    return Ok(job);
                }
                None => {
                    last_report = MatchReport {
                        reason: format!(
                            "Failed to get download URL for track '{}'",
                            candidate.display_title()
                        ),
                        compared: Some(compared_fields(track, candidate)),
                    };
                }
            }
        }

        Err(ResolveError::NoMatch(last_report))
    }

    /// Turn an accepted candidate into a job by resolving its asset URL and
    /// album metadata. `Ok(None)` means the asset is unavailable for this
    /// candidate and the caller should move on to the next query.
    async fn complete(
        &self,
        track: &PlaylistTrack,
        candidate: &TidalTrack,
    ) -> Result<Option<ResolvedJob>, ResolveError> {
        let url = match self.client.stream_url(candidate.id).await {
            Ok(Some(url)) => url,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(
                    "asset URL lookup failed for '{}': {}",
                    candidate.display_title(),
                    err
                );
                return Ok(None);
            }
        };

        // The album endpoint is the throttling hot spot; a failure here is
        // worth retrying on a later run, unlike a genuine mismatch.
        let album_info = match candidate.album_id() {
            Some(album_id) => self.client.album(album_id).await.map_err(|err| {
                ResolveError::RateLimited(format!("while fetching album metadata: {}", err))
            })?,
            None => AlbumInfo::default(),
        };

        let (title, artist, album) = if self.prefer_tidal_naming {
            (
                candidate.display_title(),
                candidate.primary_artist().to_string(),
                candidate.album_title().to_string(),
            )
        } else {
            (track.title.clone(), track.artist.clone(), track.album.clone())
        };

        let release_date = album_info
            .release_date
            .clone()
            .filter(|date| !date.is_empty())
            .or_else(|| candidate.stream_start_date.clone())
            .unwrap_or_default();

        let download_path =
            download_dir(&self.download_root, &artist, &album, self.windows_safe_names);

        Ok(Some(ResolvedJob {
            url,
            title,
            artist,
            album,
            cover_id: candidate.cover_id().map(String::from),
            track_number: candidate.track_number,
            number_of_tracks: album_info.number_of_tracks,
            release_date,
            duration: candidate.duration,
            extension: self.extension.clone(),
            tidal_title: candidate.display_title(),
            tidal_artists: candidate.artists_display(),
            tidal_album: candidate.album_title().to_string(),
            download_path,
            full_title: track.full_title(),
            index: track.index,
        }))
    }
}

enum Selection<'a> {
    Matched(&'a TidalTrack),
    NoMatch(MatchReport),
}

fn compared_fields(track: &PlaylistTrack, candidate: &TidalTrack) -> ComparedFields {
    ComparedFields {
        title: (track.title.clone(), candidate.display_title()),
        artists: (
            track.artist.clone(),
            candidate.primary_artist().to_string(),
        ),
        album: (track.album.clone(), candidate.album_title().to_string()),
    }
}

/// Apply the match cascade to a result page, returning the first candidate
/// that survives, or a report naming the last one examined.
fn pick_candidate<'a>(track: &PlaylistTrack, candidates: &'a [TidalTrack]) -> Selection<'a> {
    let mut reason = String::new();
    let mut compared = None;

    for candidate in candidates {
        let found_title = candidate.display_title();
        let found_artist = candidate.primary_artist();
        let found_album = candidate.album_title();

        compared = Some(compared_fields(track, candidate));

        // A plain source title must not land on a remix/edit of the song.
        let edit_only_on_found = !is_song_edit(&track.title) && is_song_edit(&found_title);
        debug!(
            "edit check: {} vs {} => {}",
            track.title, found_title, edit_only_on_found
        );
        if edit_only_on_found {
            reason = format!("Edit detected: '{}' vs '{}'", track.title, found_title);
            continue;
        }

        let title_match = compare(&track.title, &found_title, Field::Title);
        if title_match == MatchKind::None {
            reason = format!("Title mismatch: '{}' vs '{}'", track.title, found_title);
            continue;
        }

        // The joined-artists comparison only applies when both sides credit
        // several artists.
        let found_artists = candidate.artist_names();
        let mut artists_all_match = MatchKind::None;
        if !track.artists_all.is_empty() && found_artists.len() > 1 {
            artists_all_match = compare(
                &track.artists_all.join(";"),
                &found_artists.join(";"),
                Field::ArtistsAll,
            );
        }

        let artist_match = compare(&track.artist, found_artist, Field::Artist);
        if artist_match == MatchKind::None && artists_all_match == MatchKind::None {
            reason = format!("Artist mismatch: '{}' vs '{}'", track.artist, found_artist);
            continue;
        }

        // Exact title plus exact artist needs no album confirmation.
        if (artist_match == MatchKind::Exact || artists_all_match == MatchKind::Exact)
            && title_match == MatchKind::Exact
        {
            return Selection::Matched(candidate);
        }

        // A standalone single may sit on a differently-named album.
        let single =
            is_single(&track.title, &track.album) || is_single(&found_title, found_album);
        debug!("single check: {}", single);

        let album_match = compare(&track.album, found_album, Field::Album);
        if album_match == MatchKind::None && !single {
            reason = format!("Album mismatch: '{}' vs '{}'", track.album, found_album);
            continue;
        }

        return Selection::Matched(candidate);
    }

    if reason.is_empty() {
        return Selection::NoMatch(MatchReport::no_results());
    }
    Selection::NoMatch(MatchReport { reason, compared })
}
