//! Full-text query normalization.

use regex::Regex;
use std::sync::OnceLock;

static NON_WORD: OnceLock<Regex> = OnceLock::new();

fn non_word() -> &'static Regex {
    NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static pattern"))
}

/// Lower-cases `query`, splits it into words and joins them with
/// `separator`. Empty tokens produced by leading or trailing punctuation are
/// dropped.
pub fn normalize_query(query: &str, separator: &str) -> String {
    let lowered = query.to_lowercase();
    non_word()
        .split(&lowered)
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Normalization with the canonical `|` (boolean OR) separator.
pub fn normalize(query: &str) -> String {
    normalize_query(query, "|")
}
