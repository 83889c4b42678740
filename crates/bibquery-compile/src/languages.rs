//! Language names → MARC / ISO 639-2 (bibliographic) codes.

const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("arabic", "ara"),
    ("aramaic", "arc"),
    ("armenian", "arm"),
    ("chinese", "chi"),
    ("czech", "cze"),
    ("danish", "dan"),
    ("dutch", "dut"),
    ("english", "eng"),
    ("french", "fre"),
    ("german", "ger"),
    ("greek", "gre"),
    ("hebrew", "heb"),
    ("hungarian", "hun"),
    ("italian", "ita"),
    ("japanese", "jpn"),
    ("judeo-arabic", "jrb"),
    ("ladino", "lad"),
    ("latin", "lat"),
    ("persian", "per"),
    ("polish", "pol"),
    ("portuguese", "por"),
    ("russian", "rus"),
    ("spanish", "spa"),
    ("swedish", "swe"),
    ("syriac", "syr"),
    ("turkish", "tur"),
    ("yiddish", "yid"),
];

/// Code for a language name, if it is in the table. Case-insensitive.
pub fn language_code(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    LANGUAGE_CODES
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, code)| *code)
}

pub fn is_language_name(word: &str) -> bool {
    language_code(word).is_some()
}

/// Code for a name from explicit language phrasing ("written in X", "X
/// language"): unknown names pass through lower-cased.
pub fn language_code_or_passthrough(name: &str) -> String {
    language_code(name)
        .map(str::to_string)
        .unwrap_or_else(|| name.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_bibliographic_codes() {
        assert_eq!(language_code("Latin"), Some("lat"));
        assert_eq!(language_code("HEBREW"), Some("heb"));
        assert_eq!(language_code("German"), Some("ger"));
    }

    #[test]
    fn unknown_names_pass_through_lowercased() {
        assert_eq!(language_code("Klingon"), None);
        assert_eq!(language_code_or_passthrough("Klingon"), "klingon");
        assert_eq!(language_code_or_passthrough("French"), "fre");
    }
}
