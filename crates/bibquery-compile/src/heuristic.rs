//! Deterministic pattern-based compiler.
//!
//! Each filter family (publisher, year, place, language) owns an ordered list
//! of named regular expressions, most specific first. The first pattern that
//! yields a usable value wins for its family, and the pattern's name is
//! recorded under `debug.patterns`.

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use bibquery_plan::{
    debug_keys, normalize_match_key, CompilationError, Filter, FilterField, PlanCompiler,
    QueryPlan,
};

use crate::languages::{is_language_name, language_code, language_code_or_passthrough};

pub const BACKEND: &str = "heuristic";

/// Stops a free-text capture (publisher or place name) at the next clause.
const CLAUSE_END: &str = r"(?:\s+(?:between|from|during|in|at|by|after|before|around|circa|and|printed|published|written)\b|\s+\d|[,;.?!]|$)";

const ORDINAL_CENTURIES: &[(&str, i32)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
    ("eleventh", 11),
    ("twelfth", 12),
    ("thirteenth", 13),
    ("fourteenth", 14),
    ("fifteenth", 15),
    ("sixteenth", 16),
    ("seventeenth", 17),
    ("eighteenth", 18),
    ("nineteenth", 19),
    ("twenty-first", 21),
    ("twentieth", 20),
];

/// Words that end up in a place capture but never name a place.
const NON_PLACE_WORDS: &[&str] = &[
    "century", "centuries", "year", "years", "period", "time", "books", "editions",
];

// ============================================================================
// Patterns
// ============================================================================

struct NamedPattern<T> {
    name: &'static str,
    regex: Regex,
    extract: fn(&Captures<'_>) -> Option<T>,
}

impl<T> NamedPattern<T> {
    fn new(name: &'static str, pattern: &str, extract: fn(&Captures<'_>) -> Option<T>) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("heuristic pattern must compile"),
            extract,
        }
    }
}

/// First `(pattern name, value)` over `patterns` in order; within a pattern,
/// matches are tried left to right until one extracts.
fn first_match<T>(patterns: &[NamedPattern<T>], text: &str) -> Option<(&'static str, T)> {
    patterns.iter().find_map(|pattern| {
        pattern
            .regex
            .captures_iter(text)
            .find_map(|caps| (pattern.extract)(&caps))
            .map(|value| (pattern.name, value))
    })
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str().trim())
}

fn name_capture(caps: &Captures<'_>) -> Option<String> {
    let raw = group(caps, 1)?;
    let key = normalize_match_key(raw);
    let key = key.strip_prefix("the ").unwrap_or(&key).trim().to_string();
    (!key.is_empty()).then_some(key)
}

fn place_capture(caps: &Captures<'_>) -> Option<String> {
    let key = name_capture(caps)?;
    if key.split(' ').any(|w| NON_PLACE_WORDS.contains(&w)) {
        return None;
    }
    if key.split(' ').all(is_language_name) {
        return None;
    }
    if key.split(' ').any(|w| w.chars().any(|c| c.is_ascii_digit())) {
        return None;
    }
    Some(key)
}

fn year_pair(caps: &Captures<'_>) -> Option<(i32, i32)> {
    let start = group(caps, 1)?.parse().ok()?;
    let end = group(caps, 2)?.parse().ok()?;
    Some((start, end))
}

fn single_year(caps: &Captures<'_>) -> Option<(i32, i32)> {
    let year = group(caps, 1)?.parse().ok()?;
    Some((year, year))
}

fn century_bounds(n: i32) -> Option<(i32, i32)> {
    (1..=21).contains(&n).then(|| ((n - 1) * 100 + 1, n * 100))
}

fn numeric_century(caps: &Captures<'_>) -> Option<(i32, i32)> {
    century_bounds(group(caps, 1)?.parse().ok()?)
}

fn ordinal_century(caps: &Captures<'_>) -> Option<(i32, i32)> {
    let word = group(caps, 1)?.to_lowercase();
    let n = ORDINAL_CENTURIES
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, n)| *n)?;
    century_bounds(n)
}

fn explicit_language(caps: &Captures<'_>) -> Option<String> {
    Some(language_code_or_passthrough(group(caps, 1)?))
}

fn known_language(caps: &Captures<'_>) -> Option<String> {
    language_code(group(caps, 1)?).map(str::to_string)
}

fn publisher_patterns() -> Vec<NamedPattern<String>> {
    vec![
        NamedPattern::new(
            "published_by",
            &format!(r"(?i)\bpublished\s+by\s+(.+?){CLAUSE_END}"),
            name_capture,
        ),
        NamedPattern::new(
            "publisher_named",
            &format!(r"(?i)\bpublisher\s+(?:is\s+|named\s+|called\s+|:\s*)?(.+?){CLAUSE_END}"),
            name_capture,
        ),
        NamedPattern::new(
            "issued_by",
            &format!(r"(?i)\b(?:issued|brought\s+out)\s+by\s+(.+?){CLAUSE_END}"),
            name_capture,
        ),
    ]
}

fn year_patterns() -> Vec<NamedPattern<(i32, i32)>> {
    let ordinals = ORDINAL_CENTURIES
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join("|");
    vec![
        NamedPattern::new(
            "between_and",
            r"(?i)\bbetween\s+(\d{3,4})\s+and\s+(\d{3,4})\b",
            year_pair,
        ),
        NamedPattern::new(
            "from_to",
            r"(?i)\bfrom\s+(\d{3,4})\s+(?:to|until|till|through)\s+(\d{3,4})\b",
            year_pair,
        ),
        NamedPattern::new("hyphenated", r"\b(\d{3,4})\s*[-–]\s*(\d{3,4})\b", year_pair),
        NamedPattern::new(
            "numeric_century",
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)[\s-]+century\b",
            numeric_century,
        ),
        NamedPattern::new(
            "ordinal_century",
            &format!(r"(?i)\b({ordinals})[\s-]+century\b"),
            ordinal_century,
        ),
        NamedPattern::new(
            "single_year",
            r"(?i)\b(?:in|during|of|year)\s+(\d{4})\b",
            single_year,
        ),
    ]
}

fn place_patterns() -> Vec<NamedPattern<String>> {
    vec![
        NamedPattern::new(
            "printed_in",
            &format!(
                r"(?i)\b(?:printed|published|issued|produced)\s+(?:in|at)\s+(\p{{L}}[\p{{L}}'\- ]*?){CLAUSE_END}"
            ),
            place_capture,
        ),
        NamedPattern::new(
            "capitalized_in",
            r"\b(?:in|at)\s+(\p{Lu}[\p{L}'\-]+(?:\s+\p{Lu}[\p{L}'\-]+)*)",
            place_capture,
        ),
    ]
}

fn language_patterns() -> Vec<NamedPattern<String>> {
    vec![
        NamedPattern::new(
            "written_in",
            r"(?i)\b(?:written|composed)\s+in\s+(\p{L}[\p{L}\-]*)",
            explicit_language,
        ),
        NamedPattern::new(
            "language_word",
            r"(?i)\b(\p{L}[\p{L}\-]*)\s+language\b",
            explicit_language,
        ),
        NamedPattern::new("known_in", r"(?i)\bin\s+(\p{L}[\p{L}\-]*)", known_language),
        NamedPattern::new(
            "adjective",
            r"(?i)\b(\p{L}[\p{L}\-]*)\s+(?:books|works|texts|editions|imprints|incunabula|printing)\b",
            known_language,
        ),
    ]
}

// ============================================================================
// Compiler
// ============================================================================

pub struct HeuristicCompiler {
    publisher: Vec<NamedPattern<String>>,
    year: Vec<NamedPattern<(i32, i32)>>,
    place: Vec<NamedPattern<String>>,
    language: Vec<NamedPattern<String>>,
}

impl Default for HeuristicCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicCompiler {
    pub fn new() -> Self {
        Self {
            publisher: publisher_patterns(),
            year: year_patterns(),
            place: place_patterns(),
            language: language_patterns(),
        }
    }

    /// Compile `query_text` into a plan. Never fails: text that matches no
    /// pattern yields a plan with no filters.
    pub fn compile_text(&self, query_text: &str, limit: Option<usize>) -> QueryPlan {
        let mut filters = Vec::new();
        let mut patterns = Map::new();
        let mut swapped = false;

        if let Some((name, key)) = first_match(&self.publisher, query_text) {
            if let Ok(filter) = Filter::equals(FilterField::Publisher, key) {
                filters.push(filter);
                patterns.insert("publisher".into(), Value::from(name));
            }
        }

        if let Some((name, (start, end))) = first_match(&self.year, query_text) {
            let (start, end) = if start > end {
                swapped = true;
                (end, start)
            } else {
                (start, end)
            };
            if let Ok(filter) = Filter::range(FilterField::Year, start, end) {
                filters.push(filter);
                patterns.insert("year".into(), Value::from(name));
            }
        }

        if let Some((name, key)) = first_match(&self.place, query_text) {
            if let Ok(filter) = Filter::equals(FilterField::Place, key) {
                filters.push(filter);
                patterns.insert("place".into(), Value::from(name));
            }
        }

        if let Some((name, code)) = first_match(&self.language, query_text) {
            if let Ok(filter) = Filter::equals(FilterField::Language, code) {
                filters.push(filter);
                patterns.insert("language".into(), Value::from(name));
            }
        }

        tracing::debug!(
            query = %query_text,
            filters = filters.len(),
            swapped_year_bounds = swapped,
            "heuristic compile"
        );

        let mut plan = QueryPlan::new(query_text)
            .with_filters(filters)
            .with_limit(limit)
            .with_debug(debug_keys::BACKEND, BACKEND)
            .with_debug(debug_keys::PATTERNS, Value::Object(patterns));
        if swapped {
            plan = plan.with_debug(debug_keys::SWAPPED_YEAR_BOUNDS, true);
        }
        plan
    }
}

impl PlanCompiler for HeuristicCompiler {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn compile(&self, query_text: &str, limit: Option<usize>) -> Result<QueryPlan, CompilationError> {
        Ok(self.compile_text(query_text, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibquery_plan::FilterOp;

    fn compile(text: &str) -> QueryPlan {
        HeuristicCompiler::new().compile_text(text, None)
    }

    fn find(plan: &QueryPlan, field: FilterField) -> Option<&Filter> {
        plan.filters.iter().find(|f| f.field() == field)
    }

    #[test]
    fn publisher_and_year_range() {
        let plan = compile("All books published by X between 1500 and 1599");
        assert_eq!(plan.filters.len(), 2);

        let publisher = &plan.filters[0];
        assert_eq!(publisher.field(), FilterField::Publisher);
        assert_eq!(publisher.op(), FilterOp::Equals);
        assert_eq!(publisher.text(), Some("x"));

        let year = &plan.filters[1];
        assert_eq!(year.field(), FilterField::Year);
        assert_eq!(year.bounds(), Some((1500, 1599)));

        assert_eq!(plan.debug["patterns"]["publisher"], "published_by");
        assert_eq!(plan.debug["patterns"]["year"], "between_and");
        assert_eq!(plan.backend(), Some("heuristic"));
    }

    #[test]
    fn bare_word_yields_no_filters() {
        let plan = compile("books");
        assert!(plan.filters.is_empty());
    }

    #[test]
    fn publisher_name_is_normalized() {
        let plan = compile("books published by [Aldus Manutius], in 1502");
        let publisher = find(&plan, FilterField::Publisher).unwrap();
        assert_eq!(publisher.text(), Some("aldus manutius"));
        assert_eq!(find(&plan, FilterField::Year).unwrap().bounds(), Some((1502, 1502)));
    }

    #[test]
    fn year_pattern_variants() {
        let cases = [
            ("from 1600 to 1650", (1600, 1650), "from_to"),
            ("imprints 1700-1720", (1700, 1720), "hyphenated"),
            ("16th century editions", (1501, 1600), "numeric_century"),
            ("sixteenth century editions", (1501, 1600), "ordinal_century"),
            ("twenty-first century reprints", (2001, 2100), "ordinal_century"),
            ("a book printed during 1550", (1550, 1550), "single_year"),
        ];
        for (text, bounds, name) in cases {
            let plan = compile(text);
            let year = find(&plan, FilterField::Year).unwrap_or_else(|| panic!("{text}"));
            assert_eq!(year.bounds(), Some(bounds), "{text}");
            assert_eq!(plan.debug["patterns"]["year"], name, "{text}");
        }
    }

    #[test]
    fn reversed_bounds_are_swapped_and_recorded() {
        let plan = compile("between 1599 and 1500");
        assert_eq!(find(&plan, FilterField::Year).unwrap().bounds(), Some((1500, 1599)));
        assert_eq!(plan.debug[debug_keys::SWAPPED_YEAR_BOUNDS], true);
    }

    #[test]
    fn place_from_printed_in() {
        let plan = compile("books printed in Venice between 1500 and 1550");
        assert_eq!(find(&plan, FilterField::Place).unwrap().text(), Some("venice"));
        assert_eq!(plan.debug["patterns"]["place"], "printed_in");
    }

    #[test]
    fn century_phrase_is_not_a_place() {
        let plan = compile("books printed in the sixteenth century");
        assert!(find(&plan, FilterField::Place).is_none());
        assert_eq!(find(&plan, FilterField::Year).unwrap().bounds(), Some((1501, 1600)));
    }

    #[test]
    fn known_language_after_in_is_not_a_place() {
        let plan = compile("books in Latin in Amsterdam");
        assert_eq!(find(&plan, FilterField::Language).unwrap().text(), Some("lat"));
        assert_eq!(find(&plan, FilterField::Place).unwrap().text(), Some("amsterdam"));
    }

    #[test]
    fn explicit_unknown_language_passes_through() {
        let plan = compile("texts written in Klingon");
        assert_eq!(find(&plan, FilterField::Language).unwrap().text(), Some("klingon"));

        let plan = compile("Hebrew books");
        assert_eq!(find(&plan, FilterField::Language).unwrap().text(), Some("heb"));
    }

    #[test]
    fn filters_follow_family_order() {
        let plan = compile("Hebrew books printed in Venice published by Bomberg in 1520");
        let fields: Vec<_> = plan.filters.iter().map(|f| f.field()).collect();
        assert_eq!(
            fields,
            vec![
                FilterField::Publisher,
                FilterField::Year,
                FilterField::Place,
                FilterField::Language
            ]
        );
    }

    #[test]
    fn limit_is_carried() {
        let plan = HeuristicCompiler::new().compile_text("books", Some(5));
        assert_eq!(plan.limit, Some(5));
    }
}
