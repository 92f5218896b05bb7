//! Fuzzy string similarity on a 0-100 scale.

use similar::TextDiff;
use std::collections::BTreeSet;

/// Indel similarity over characters: `2 * matches / (len_a + len_b) * 100`
pub fn ratio(a: &str, b: &str) -> f64 {
    TextDiff::from_chars(a, b).ratio() as f64 * 100.0
}

/// Token-order-insensitive similarity.
///
/// Both inputs are split on whitespace into token sets. If the intersection
/// is non-empty and one set contains the other, the result is 100. Otherwise
/// it is the best [`ratio`] among the intersection and each side's remainder.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let diff_ab = diff_ab.join(" ");
    let diff_ba = diff_ba.join(" ");
    let mut best = ratio(&diff_ab, &diff_ba);

    if sect.is_empty() {
        return best;
    }

    let sect = sect.join(" ");
    let sect_ab = format!("{} {}", sect, diff_ab);
    let sect_ba = format!("{} {}", sect, diff_ba);

    best = best
        .max(ratio(&sect, &sect_ab))
        .max(ratio(&sect, &sect_ba))
        .max(ratio(&sect_ab, &sect_ba));
    best
}
