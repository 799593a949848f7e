//! Edit-distance similarity over normalized text.

use crate::text::fold;

/// Similarity of two strings in `[0, 1]`.
///
/// Exact match after folding scores 1.0, containment 0.9, otherwise
/// normalized Levenshtein over the folded forms.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = fold(a);
    let b = fold(b);

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.9;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein(&a, &b);
    (1.0 - distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Levenshtein distance, two-row rolling buffer.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let (m, n) = (a_chars.len(), b_chars.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            let deletion = prev[j] + 1;
            let insertion = curr[j - 1] + 1;
            let substitution = prev[j - 1] + cost;
            curr[j] = deletion.min(insertion).min(substitution);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
