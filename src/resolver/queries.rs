//! Search query generation for a playlist track.
//!
//! Produces progressively looser queries: the full "Artist - Title" form
//! first, then variants with segments or feature credits dropped, down to
//! the bare artist name as a last resort.

use std::collections::HashSet;

use crate::matching::strip_features;
use crate::playlist::PlaylistTrack;

/// Build the ordered list of search queries for a track.
///
/// Duplicates keep their first position; empty variants are dropped.
pub fn search_queries(track: &PlaylistTrack) -> Vec<String> {
    let full_title = track.full_title();
    let mut queries = vec![full_title.clone()];

    // All credited artists, when the playlist row carries more than one.
    if !track.artists_all.is_empty() {
        queries.push(format!("{} - {}", track.artists_all.join(";"), track.title));
    }

    // Drop the artist: "[Artist - ]Title - Special Edition".
    let parts: Vec<&str> = full_title.split(" - ").collect();
    queries.push(parts[1..].join(" - "));

    if parts.len() > 2 {
        // Drop the last segment: "Artist - Title[ - Special Edition]".
        queries.push(parts[..parts.len() - 1].join(" - "));
        // Drop both ends: "[Artist - ]Title[ - Special Edition]".
        queries.push(parts[1..parts.len() - 1].join(" - "));
    }

    // Feature credits removed from the title.
    let stripped = strip_features(&track.title);
    queries.push(format!("{} - {}", track.artist, stripped));
    queries.push(stripped);

    // Last resort: the artist alone.
    queries.push(track.artist.clone());

    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter(|q| !q.trim().is_empty() && seen.insert(q.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str, artists_all: &[&str], album: &str) -> PlaylistTrack {
        PlaylistTrack {
            index: 1,
            title: title.to_string(),
            artist: artist.to_string(),
            artists_all: artists_all.iter().map(|s| s.to_string()).collect(),
            album: album.to_string(),
        }
    }

    #[test]
    fn test_simple_track() {
        let queries = search_queries(&track("Hello", "Adele", &[], "21"));

        assert_eq!(queries, vec!["Adele - Hello", "Hello", "Adele"]);
    }

    #[test]
    fn test_multiple_artists_adds_joined_query() {
        let queries = search_queries(&track(
            "Get Lucky",
            "Daft Punk",
            &["Daft Punk", "Pharrell Williams"],
            "Random Access Memories",
        ));

        assert_eq!(
            queries,
            vec![
                "Daft Punk - Get Lucky",
                "Daft Punk;Pharrell Williams - Get Lucky",
                "Get Lucky",
                "Daft Punk",
            ]
        );
    }

    #[test]
    fn test_dashed_title_generates_segment_variants() {
        let queries = search_queries(&track("Song - Special Edition", "Artist", &[], "Album"));

        assert_eq!(
            queries,
            vec![
                "Artist - Song - Special Edition",
                "Song - Special Edition",
                "Artist - Song",
                "Song",
                "Artist",
            ]
        );
    }

    #[test]
    fn test_feature_credit_variants() {
        let queries = search_queries(&track("Hello (feat. Jane)", "Adele", &[], "21"));

        assert_eq!(
            queries,
            vec![
                "Adele - Hello (feat. Jane)",
                "Hello (feat. Jane)",
                "Adele - Hello",
                "Hello",
                "Adele",
            ]
        );
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        // A single credited artist joins back into "Artist - Title", and
        // stripping features is a no-op here, so every looser variant
        // collapses into an earlier one.
        let queries = search_queries(&track("Hello", "Adele", &["Adele"], "21"));

        assert_eq!(queries, vec!["Adele - Hello", "Hello", "Adele"]);
    }
}
