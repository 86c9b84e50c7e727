//! Keyword matching helpers shared by the rule-based services.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase `text` and strip accents so that "Devolución" matches "devolucion".
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// True when any of `needles` occurs in `text`, ignoring case and accents.
pub fn contains_any(text: &str, needles: &[&str]) -> bool {
    let folded = fold(text);
    needles.iter().any(|n| folded.contains(&fold(n)))
}

/// The subset of `needles` that occur in `text`.
pub fn matching<'a>(text: &str, needles: &[&'a str]) -> Vec<&'a str> {
    let folded = fold(text);
    needles
        .iter()
        .copied()
        .filter(|n| folded.contains(&fold(n)))
        .collect()
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
