//! Field-specific text cleansing applied before comparison.
//!
//! Titles go through an ordered rewrite chain (feature credits, remaster and
//! version qualifiers, "from ..." suffixes, separator merging, bracket
//! stripping); artists only lose feature credits; albums lose remaster,
//! version and reissue qualifiers. Rule order matters: each rule operates on
//! the previous rule's output.

use lazy_static::lazy_static;
use regex::Regex;

/// Which track field a string belongs to; selects the cleansing rules and the
/// token-splitting behavior of the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Artist,
    ArtistsAll,
    Album,
}

lazy_static! {
    // Bracketed "(with X)" / "(feat. X)" / "(featuring X)".
    static ref FEATURE_BRACKETED: Regex =
        Regex::new(r"(?i)[\(\[\{]\s*(?:with|feat\.?|featuring)\s+.*?[\)\]\}]").unwrap();
    // Inline "feat. X" / "ft. X" / "featuring X" outside brackets.
    static ref FEATURE_INLINE: Regex =
        Regex::new(r"(?i)\b(?:feat\.?|ft\.?|featuring)\s+[^-()]+").unwrap();

    static ref REMASTER_BRACKETED: Regex =
        Regex::new(r"(?i)[\(\[][^\)\]]*remaster(ed)?[^\)\]]*[\)\]]").unwrap();
    // "Song - Remastered 2011", "Song - 2011 Remaster": the whole suffix goes.
    static ref REMASTER_SUFFIX: Regex =
        Regex::new(r"(?i)\s*[-–]\s*(\d{4}\s+)?remaster(ed)?\b.*$").unwrap();
    static ref REMASTER_BARE: Regex = Regex::new(r"(?i)\bremaster(ed)?\b").unwrap();
    static ref VERSION_QUALIFIERS: Regex =
        Regex::new(r"(?i)radio edit|single version|album version|version").unwrap();

    static ref FROM_DASHED: Regex = Regex::new(r"(?i)\s*[-–]\s*from\s+.*").unwrap();
    static ref FROM_PARENS: Regex = Regex::new(r"(?i)\(from\s+.*?\)").unwrap();
    static ref FROM_BRACKETS: Regex = Regex::new(r"(?i)\[from\s+.*?\]").unwrap();

    // Title/subtitle separators merge into a single space.
    static ref SEPARATORS: Regex = Regex::new(r"\s*[-–]\s*").unwrap();
    // One layer of leftover brackets, keeping the inner text.
    static ref BRACKET_SHELL: Regex = Regex::new(r"[\(\[\{]+(.*?)[\)\]\}]+").unwrap();

    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref TRAILING_NOISE: Regex = Regex::new(r"[\s\-–:]+$").unwrap();

    // Reissue annotations on albums ("Deluxe Edition" class).
    static ref REISSUE_BRACKETED: Regex = Regex::new(
        r"(?i)[\(\[][^\)\]]*\b(?:deluxe|expanded|anniversary|re-?issue|bonus track)\b[^\)\]]*[\)\]]",
    )
    .unwrap();
    static ref REISSUE_SUFFIX: Regex = Regex::new(
        r"(?i)\s*[-–]\s*(?:super )?(?:deluxe|expanded|anniversary|re-?issue)(?:\s+(?:edition|version))?\s*$",
    )
    .unwrap();
}

/// Cleanses `text` according to the rules for `field`.
pub fn cleanse(text: &str, field: Field) -> String {
    match field {
        Field::Artist | Field::ArtistsAll => strip_features(text),
        Field::Title => clean_title(text),
        Field::Album => clean_album(text),
    }
}

/// Removes feature credits only; also used by the query generator.
pub fn strip_features(text: &str) -> String {
    let t = FEATURE_BRACKETED.replace_all(text, "");
    let t = FEATURE_INLINE.replace_all(&t, "");
    t.trim().to_string()
}

fn clean_title(text: &str) -> String {
    let t = FEATURE_BRACKETED.replace_all(text, "");
    let t = FEATURE_INLINE.replace_all(&t, "");
    let t = REMASTER_BRACKETED.replace_all(&t, "");
    let t = REMASTER_SUFFIX.replace_all(&t, "");
    let t = REMASTER_BARE.replace_all(&t, "");
    let t = VERSION_QUALIFIERS.replace_all(&t, "");
    let t = FROM_DASHED.replace_all(&t, "");
    let t = FROM_PARENS.replace_all(&t, "");
    let t = FROM_BRACKETS.replace_all(&t, "");
    let t = SEPARATORS.replace_all(&t, " ");
    let t = BRACKET_SHELL.replace_all(&t, "$1");
    let t = MULTI_SPACE.replace_all(&t, " ");
    let t = TRAILING_NOISE.replace_all(&t, "");
    t.trim().to_string()
}

fn clean_album(text: &str) -> String {
    let t = REMASTER_BRACKETED.replace_all(text, "");
    let t = REMASTER_SUFFIX.replace_all(&t, "");
    let t = REMASTER_BARE.replace_all(&t, "");
    let t = VERSION_QUALIFIERS.replace_all(&t, "");
    let t = REISSUE_BRACKETED.replace_all(&t, "");
    let t = REISSUE_SUFFIX.replace_all(&t, "");
    let t = MULTI_SPACE.replace_all(&t, " ");
    let t = TRAILING_NOISE.replace_all(&t, "");
    t.trim().to_string()
}
