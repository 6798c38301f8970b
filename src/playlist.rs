//! Source playlist loading.
//!
//! The input is a playlist CSV export (Exportify-style): one row per track,
//! columns matched case-insensitively on `Track Name`, `Artist Name(s)` and
//! `Album Name`. Multiple artists are semicolon-separated in a single cell.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("playlist file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("unsupported CSV format, found columns: {0:?}")]
    UnsupportedFormat(Vec<String>),
    #[error("failed to read playlist: {0}")]
    Csv(#[from] csv::Error),
}

/// One playlist row. Immutable after loading; `index` is 1-based playlist
/// order, used for operator-facing log lines only.
#[derive(Debug, Clone)]
pub struct PlaylistTrack {
    pub index: usize,
    pub title: String,
    /// Primary artist (first of `artists_all` when there are several).
    pub artist: String,
    /// All artists in playlist order; empty when the row names only one.
    pub artists_all: Vec<String>,
    pub album: String,
}

impl PlaylistTrack {
    /// Canonical cache key. Must stay stable across runs for the same row.
    pub fn full_title(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixField {
    Title,
    Artist,
    Album,
}

/// Source-export names that never match the catalog, replaced at load time.
const NAMING_FIXES: [(&str, FixField, &str); 5] = [
    ("¥$;", FixField::Artist, ""),
    ("JAY-Z", FixField::Artist, "JAY Z"),
    ("Bad Meets Evil", FixField::Artist, "Eminem;Royce da 5'9\""),
    ("Original Me", FixField::Album, "Everytime We Touch"),
    ("YMCA - Original Version 1978", FixField::Title, "Y.M.C.A."),
];

fn apply_naming_fixes(text: &str, field: FixField) -> String {
    let mut fixed = text.to_string();
    for (pattern, fix_field, replacement) in NAMING_FIXES {
        if fix_field == field && fixed.contains(pattern) {
            fixed = fixed.replace(pattern, replacement);
        }
    }
    fixed
}

/// Loads the playlist CSV. Missing file or missing required columns are
/// fatal; rows without a title or artist are skipped.
pub fn load_playlist(path: &Path) -> Result<Vec<PlaylistTrack>, PlaylistError> {
    if !path.exists() {
        return Err(PlaylistError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let find_column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase() == name)
    };

    let title_col = find_column("track name");
    let artist_col = find_column("artist name(s)");
    let album_col = find_column("album name");

    let (title_col, artist_col) = match (title_col, artist_col) {
        (Some(title), Some(artist)) => (title, artist),
        _ => {
            return Err(PlaylistError::UnsupportedFormat(
                headers.iter().map(String::from).collect(),
            ))
        }
    };

    let mut tracks = Vec::new();
    let mut index = 1;
    for record in reader.records() {
        let record = record?;
        let title = apply_naming_fixes(record.get(title_col).unwrap_or(""), FixField::Title);
        let artist_cell =
            apply_naming_fixes(record.get(artist_col).unwrap_or(""), FixField::Artist);
        let album = album_col
            .and_then(|col| record.get(col))
            .unwrap_or_default();
        let album = apply_naming_fixes(album, FixField::Album);

        let (artist, artists_all) = split_artists(&artist_cell);
        if title.is_empty() || artist.is_empty() {
            continue;
        }

        tracks.push(PlaylistTrack {
            index,
            title,
            artist,
            artists_all,
            album,
        });
        index += 1;
    }

    Ok(tracks)
}

fn split_artists(cell: &str) -> (String, Vec<String>) {
    if cell.contains(';') {
        let all: Vec<String> = cell
            .split(';')
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect();
        let primary = all.first().cloned().unwrap_or_default();
        (primary, all)
    } else {
        (cell.to_string(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_basic_playlist() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\n\
             Song One,Artist A,Album X\n\
             Song Two,Artist B,Album Y\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].index, 1);
        assert_eq!(tracks[0].title, "Song One");
        assert_eq!(tracks[0].artist, "Artist A");
        assert!(tracks[0].artists_all.is_empty());
        assert_eq!(tracks[1].full_title(), "Artist B - Song Two");
    }

    #[test]
    fn test_load_headers_case_insensitive() {
        let file = write_csv("track name,ARTIST NAME(S),album name\nSong,Artist,Album\n");
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn test_load_splits_multiple_artists() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\nSong,First Artist;Second Artist,Album\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks[0].artist, "First Artist");
        assert_eq!(
            tracks[0].artists_all,
            vec!["First Artist".to_string(), "Second Artist".to_string()]
        );
        // Cache key uses the primary artist only.
        assert_eq!(tracks[0].full_title(), "First Artist - Song");
    }

    #[test]
    fn test_load_album_column_optional() {
        let file = write_csv("Track Name,Artist Name(s)\nSong,Artist\n");
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks[0].album, "");
    }

    #[test]
    fn test_load_missing_artist_column_fails() {
        let file = write_csv("Track Name,Album Name\nSong,Album\n");
        let err = load_playlist(file.path()).unwrap_err();
        assert!(matches!(err, PlaylistError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load_playlist(Path::new("/no/such/playlist.csv")).unwrap_err();
        assert!(matches!(err, PlaylistError::NotFound(_)));
    }

    #[test]
    fn test_load_skips_rows_without_title_or_artist() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\n\
             ,Artist,Album\n\
             Song,,Album\n\
             Kept,Artist,Album\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Kept");
        assert_eq!(tracks[0].index, 1);
    }

    #[test]
    fn test_load_quoted_fields() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\n\
             \"Song, With Comma\",Artist,\"Album, Too\"\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks[0].title, "Song, With Comma");
        assert_eq!(tracks[0].album, "Album, Too");
    }

    #[test]
    fn test_naming_fixes_applied() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\n\
             YMCA - Original Version 1978,Village People,Album\n\
             Song,JAY-Z,Album\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks[0].title, "Y.M.C.A.");
        assert_eq!(tracks[1].artist, "JAY Z");
    }

    #[test]
    fn test_naming_fix_expands_collective() {
        let file = write_csv(
            "Track Name,Artist Name(s),Album Name\nSong,Bad Meets Evil,Album\n",
        );
        let tracks = load_playlist(file.path()).unwrap();
        assert_eq!(tracks[0].artist, "Eminem");
        assert_eq!(tracks[0].artists_all.len(), 2);
    }
}
