//! Filesystem naming helpers: OS-safe file names, download directory layout,
//! and upward pruning of emptied directories after a cache sync.

use std::path::{Path, PathBuf};

/// Characters Windows refuses in file names. With `windows_safe` off, only the
/// path-breaking subset (`/` and NUL) is removed.
const WINDOWS_DISALLOWED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes a track/artist/album name safe to use as a single path component.
/// Disallowed characters are removed (not replaced) and trailing spaces and
/// dots are trimmed, matching how the existing libraries on disk were named.
pub fn safe_file_name(name: &str, windows_safe: bool) -> String {
    let kept: String = if windows_safe {
        name.chars()
            .filter(|c| !WINDOWS_DISALLOWED.contains(c) && *c != '\0')
            .collect()
    } else {
        name.chars().filter(|c| *c != '/' && *c != '\0').collect()
    };
    kept.trim_matches(|c| c == ' ' || c == '.').to_string()
}

/// Derives the directory a track downloads into: `{root}/{artist}/{album}`,
/// both components sanitized. Empty components are skipped rather than
/// producing a dangling separator.
pub fn download_dir(root: &Path, artist: &str, album: &str, windows_safe: bool) -> PathBuf {
    let mut dir = root.to_path_buf();
    for part in [
        safe_file_name(artist, windows_safe),
        safe_file_name(album, windows_safe),
    ] {
        if !part.is_empty() {
            dir.push(part);
        }
    }
    dir
}

/// Removes `dir` and its ancestors while they are empty, stopping at `root`
/// (exclusive) or at the first non-empty directory. Directories outside
/// `root` are never touched.
pub fn prune_empty_dirs(dir: &Path, root: &Path) {
    let mut current = dir.to_path_buf();
    while current != root && current.starts_with(root) {
        match std::fs::read_dir(&current) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        if std::fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}
