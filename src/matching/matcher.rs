//! Classification of (expected, candidate) field pairs.
//!
//! `compare` is the single entry point: cleanse both sides for the field,
//! normalize, then classify as Exact, Substring, Skip or None. Skip means
//! "this field must not count against the candidate" (compilation albums,
//! strings too short to compare safely).

use std::collections::HashSet;

use tracing::debug;

use super::cleanse::{cleanse, Field};
use super::normalize::normalize;

/// Outcome of comparing two strings for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Substring,
    Skip,
    None,
}

const EDIT_KEYWORDS: [&str; 5] = ["remix", "edit", "slowed", "instrumental", "live"];

const COLLECTION_KEYWORDS: [&str; 8] = [
    "greatest hits",
    "best of",
    "anthology",
    "compilation",
    "collection",
    "box set",
    "hits",
    "classics",
];

/// True if the title names an altered cut of a song (remix, live take, ...).
pub fn is_song_edit(title: &str) -> bool {
    let lowered = title.to_lowercase();
    EDIT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// True if the title names a compilation-style release.
pub fn is_collection(title: &str) -> bool {
    let lowered = title.to_lowercase();
    COLLECTION_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// True when a track is a standalone single: its cleansed title equals its
/// own cleansed album. Both sides go through the title rule chain.
pub fn is_single(title: &str, album: &str) -> bool {
    cleanse(title, Field::Title).to_lowercase() == cleanse(album, Field::Title).to_lowercase()
}

/// Compares an expected string against a candidate string for one field.
pub fn compare(expected: &str, found: &str, field: Field) -> MatchKind {
    let expected_clean = cleanse(expected, field);
    let found_clean = cleanse(found, field);
    let expected_norm = normalize(&expected_clean);
    let found_norm = normalize(&found_clean);

    debug!(
        "comparing '{}' with '{}' for field {:?}",
        expected_norm, found_norm, field
    );

    if expected_norm == found_norm {
        return MatchKind::Exact;
    }

    // A compilation on the candidate side says nothing about the match.
    if field == Field::Album && is_collection(&found_clean) {
        return MatchKind::Skip;
    }

    // Too short to compare safely.
    if expected_norm.chars().count() < 3 || found_norm.chars().count() < 3 {
        return MatchKind::Skip;
    }

    let (expected_parts, found_parts) = if field == Field::ArtistsAll {
        (split_on(&expected_norm, ';'), split_on(&found_norm, ';'))
    } else {
        (
            expected_norm.split_whitespace().collect::<HashSet<_>>(),
            found_norm.split_whitespace().collect::<HashSet<_>>(),
        )
    };

    // First qualifying token pair wins; this is a "good enough" scan in
    // unspecified order, not a best-match search.
    for expected_part in &expected_parts {
        for found_part in &found_parts {
            if expected_part.chars().count() >= 3
                && found_part.chars().count() >= 3
                && (expected_part.contains(found_part) || found_part.contains(expected_part))
            {
                return MatchKind::Substring;
            }
        }
    }

    MatchKind::None
}

fn split_on(s: &str, sep: char) -> HashSet<&str> {
    s.split(sep).filter(|p| !p.is_empty()).collect()
}
