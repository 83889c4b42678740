//! Match-key normalization.
//!
//! The index stores `*_norm` columns produced at build time with exactly these
//! rules, and the values bound into SQL are produced here too. The two sides
//! are compared byte for byte, so any change to the index-time rules must be
//! mirrored in this module.

/// Normalize a publisher / place / agent string into its lookup key.
///
/// Rules, in order:
/// 1. casefold (Unicode lowercase, `ß` → `ss`)
/// 2. drop square brackets (cataloguers bracket supplied data: `[Venice]`)
/// 3. drop punctuation other than hyphens
/// 4. collapse runs of whitespace to one space and trim
pub fn normalize_match_key(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        match ch {
            'ß' => folded.push_str("ss"),
            '[' | ']' => {}
            c if c.is_alphanumeric() || c == '-' => folded.push(c),
            c if c.is_whitespace() => folded.push(' '),
            _ => {}
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Codes and controlled terms (language codes, roles, agent types) are only
/// trimmed and lowercased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_brackets_and_punctuation() {
        assert_eq!(normalize_match_key("[Venetiis] :"), "venetiis");
        assert_eq!(normalize_match_key("Apud Aldum, et Andream Socerum."), "apud aldum et andream socerum");
    }

    #[test]
    fn keeps_hyphens_and_collapses_whitespace() {
        assert_eq!(normalize_match_key("  Frankfurt   am\tMain-Höchst "), "frankfurt am main-höchst");
        assert_eq!(normalize_match_key("Officina_Plantiniana"), "officinaplantiniana");
    }

    #[test]
    fn casefolds_sharp_s() {
        assert_eq!(normalize_match_key("Straßburg"), "strassburg");
    }

    #[test]
    fn idempotent() {
        let once = normalize_match_key("[S.l.] : Daniel Bomberg");
        assert_eq!(normalize_match_key(&once), once);
    }

    #[test]
    fn codes_are_trimmed_and_lowercased() {
        assert_eq!(normalize_code(" LAT "), "lat");
    }
}
