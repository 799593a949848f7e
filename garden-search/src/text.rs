//! Text normalization for lexical matching.
//!
//! Case-folds, strips diacritics (NFKD then combining-mark removal),
//! collapses whitespace, and drops stop tokens from the tokenization.
//! Pure functions; no allocation beyond the output strings.

use unicode_normalization::UnicodeNormalization;

/// Tokens too common to carry matching signal.
const STOP_TOKENS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "with",
];

/// A normalized query: the collapsed string plus its content tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub tokens: Vec<String>,
}

/// Normalize a query or document field for lexical comparison.
pub fn normalize(input: &str) -> Normalized {
    let folded = fold(input);
    let tokens = folded
        .split_whitespace()
        .filter(|token| !STOP_TOKENS.contains(token))
        .map(str::to_string)
        .collect();

    Normalized {
        text: folded,
        tokens,
    }
}

/// Case-fold, strip diacritics, collapse whitespace.
pub fn fold(input: &str) -> String {
    let stripped: String = input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{20D0}'..='\u{20FF}')
}
