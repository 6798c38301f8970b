use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalizes a string for comparison: lowercase, strip diacritics
/// (NFD decomposition, combining marks dropped), trim surrounding whitespace.
///
/// Pure and idempotent; comparisons elsewhere rely on both properties.
pub fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let folded: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    folded.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Hello World "), "hello world");
    }

    #[test]
    fn test_normalize_strips_diacritics() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("Mötley Crüe"), "motley crue");
        assert_eq!(normalize("Sigur Rós"), "sigur ros");
    }

    #[test]
    fn test_normalize_idempotent() {
        for s in ["Café del Mar", "  ÅÄÖ  ", "plain ascii", "ñandú"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }
}
