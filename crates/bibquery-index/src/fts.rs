//! Text-matching helpers: FTS5 query quoting and LIKE patterns.

/// FTS5 MATCH expression for a user phrase: every whitespace token becomes a
/// quoted string (internal quotes doubled), so FTS operators and column
/// filters in user input are matched literally. Tokens are implicitly AND-ed.
pub fn fts_quote(text: &str) -> String {
    text.split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `%text%` with LIKE wildcards escaped; pair with `ESCAPE '\'`.
pub fn like_contains(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
