//! Type definitions for catalog service API responses.
//!
//! Defines structs for deserializing responses from the search, playback
//! and album endpoints. These types match the JSON structure returned by
//! the public instances.

use serde::{Deserialize, Serialize};

// =============================================================================
// Search Types
// =============================================================================

/// Wrapper for search API response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    /// Payload envelope
    pub data: SearchItems,
}

/// Inner payload of a search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItems {
    /// Track results, best match first
    #[serde(default)]
    pub items: Vec<TidalTrack>,
}

/// A track document returned by the search endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TidalTrack {
    /// Numeric track ID, used for playback lookups
    pub id: u64,
    /// Track title without version qualifier
    #[serde(default)]
    pub title: String,
    /// Version qualifier (e.g. "Remastered 2011"), often null
    #[serde(default)]
    pub version: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: u32,
    /// Position within the album
    #[serde(default, rename = "trackNumber")]
    pub track_number: u32,
    /// First date the track was streamable, ISO-8601
    #[serde(default, rename = "streamStartDate")]
    pub stream_start_date: Option<String>,
    /// Primary artist
    #[serde(default)]
    pub artist: Option<TidalArtist>,
    /// All credited artists
    #[serde(default)]
    pub artists: Vec<TidalArtist>,
    /// Album the track belongs to
    #[serde(default)]
    pub album: Option<TidalAlbum>,
}

impl TidalTrack {
    /// Title with the version qualifier appended in parentheses, when present.
    ///
    /// The search endpoint splits "Song (Remastered 2011)" into `title` and
    /// `version`; matching and display both want the combined form.
    pub fn display_title(&self) -> String {
        match self.version.as_deref() {
            Some(version) if !version.is_empty() => format!("{} ({})", self.title, version),
            _ => self.title.clone(),
        }
    }

    /// Name of the primary artist, or empty when absent.
    pub fn primary_artist(&self) -> &str {
        self.artist.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    /// Names of all credited artists, in credit order.
    pub fn artist_names(&self) -> Vec<String> {
        self.artists.iter().map(|a| a.name.clone()).collect()
    }

    /// Display string for the artist credit: all artists joined with ", "
    /// when more than one is credited, otherwise the primary artist.
    pub fn artists_display(&self) -> String {
        if self.artists.len() > 1 {
            self.artist_names().join(", ")
        } else {
            self.primary_artist().to_string()
        }
    }

    /// Album title, or empty when absent.
    pub fn album_title(&self) -> &str {
        self.album.as_ref().map(|a| a.title.as_str()).unwrap_or("")
    }

    /// Numeric album ID, when the track carries album info.
    pub fn album_id(&self) -> Option<u64> {
        self.album.as_ref().map(|a| a.id)
    }

    /// Cover art identifier, when the album carries one.
    pub fn cover_id(&self) -> Option<&str> {
        self.album.as_ref().and_then(|a| a.cover.as_deref())
    }
}

/// An artist reference embedded in a track document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TidalArtist {
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// An album reference embedded in a track document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TidalAlbum {
    /// Numeric album ID, used for metadata lookups
    #[serde(default)]
    pub id: u64,
    /// Album title
    #[serde(default)]
    pub title: String,
    /// Cover art identifier (dash-separated UUID), often null
    #[serde(default)]
    pub cover: Option<String>,
}

// =============================================================================
// Playback Types
// =============================================================================

/// Wrapper for the playback (track) endpoint response.
///
/// `data` is absent when no stream is available for the requested quality.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackResponse {
    #[serde(default)]
    pub data: Option<PlaybackData>,
}

/// Inner payload of a playback response.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackData {
    /// Base64-encoded JSON manifest holding the stream URLs
    pub manifest: String,
}

/// Decoded playback manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamManifest {
    /// Direct URLs to the audio asset; the first entry is used
    #[serde(default)]
    pub urls: Vec<String>,
}

// =============================================================================
// Album Types
// =============================================================================

/// Wrapper for the album metadata endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumResponse {
    pub data: AlbumInfo,
}

/// Album metadata used to enrich resolved tracks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlbumInfo {
    /// Total number of tracks on the album
    #[serde(default, rename = "numberOfTracks")]
    pub number_of_tracks: u32,
    /// Release date, ISO-8601 date (e.g. "2011-01-25")
    #[serde(default, rename = "releaseDate")]
    pub release_date: Option<String>,
}
