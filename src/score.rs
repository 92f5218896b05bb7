//! Multi-signal similarity between an incoming report and a stored record.
//!
//! Each signal is capped on its own before the terms are summed, so no single
//! one can dominate. Text closeness carries most of the weight.

use crate::fuzzy::token_set_ratio;
use crate::types::{ErrorRecord, Fingerprint};
use serde::Serialize;

pub const TEXT_WEIGHT: f64 = 60.0;
pub const TAG_POINTS: f64 = 2.0;
pub const TAG_CAP: f64 = 20.0;
pub const RELIABILITY_WEIGHT: f64 = 10.0;
pub const FREQUENCY_CAP: f64 = 10.0;
pub const CATEGORY_BONUS: f64 = 1.10;
pub const MAX_SCORE: f64 = 100.0;

/// Raw inputs to the scoring formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    /// Token set ratio between report and pattern, 0-100
    pub text_ratio: f64,
    pub shared_tags: usize,
    pub success_rate: f64,
    pub occurrence_count: u32,
    pub category_matches: bool,
}

/// Per-signal contribution to a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub text: f64,
    pub tags: f64,
    pub reliability: f64,
    pub frequency: f64,
    pub category_bonus: bool,
    pub total: f64,
}

impl Signals {
    /// `lowered_text` must already be lower-cased
    pub fn collect(lowered_text: &str, fingerprint: &Fingerprint, record: &ErrorRecord, category_matches: bool) -> Self {
        let text_ratio = if record.pattern.is_empty() {
            0.0
        } else {
            token_set_ratio(lowered_text, &record.pattern.to_lowercase())
        };

        Self {
            text_ratio,
            shared_tags: fingerprint.tags.intersection(&record.tags).count(),
            success_rate: record.success_rate,
            occurrence_count: record.occurrence_count,
            category_matches,
        }
    }

    pub fn breakdown(&self) -> ScoreBreakdown {
        let text = (self.text_ratio.clamp(0.0, 100.0) / 100.0) * TEXT_WEIGHT;
        let tags = (self.shared_tags as f64 * TAG_POINTS).min(TAG_CAP);
        let reliability = (self.success_rate.clamp(0.0, 100.0) / 100.0) * RELIABILITY_WEIGHT;
        let frequency = ((self.occurrence_count as f64 + 1.0).log2() * 2.0).min(FREQUENCY_CAP);

        let mut total = text + tags + reliability + frequency;
        if self.category_matches {
            total *= CATEGORY_BONUS;
        }

        ScoreBreakdown {
            text,
            tags,
            reliability,
            frequency,
            category_bonus: self.category_matches,
            total: total.clamp(0.0, MAX_SCORE),
        }
    }
}

/// Score a record against an incoming report, 0-100
pub fn score(text: &str, fingerprint: &Fingerprint, record: &ErrorRecord, category_matches: bool) -> f64 {
    breakdown(text, fingerprint, record, category_matches).total
}

pub fn breakdown(
    text: &str,
    fingerprint: &Fingerprint,
    record: &ErrorRecord,
    category_matches: bool,
) -> ScoreBreakdown {
    Signals::collect(&text.to_lowercase(), fingerprint, record, category_matches).breakdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::types::{normalize_tags, Category, NewRecord, Severity};
    use chrono::Utc;

    fn record(pattern: &str, tags: &[&str], rate: f64, occurrences: u32) -> ErrorRecord {
        let mut r = NewRecord {
            pattern: pattern.to_string(),
            category: Category::Python,
            severity: Severity::High,
            tags: normalize_tags(tags),
            solution: String::new(),
            fix_command: None,
            stack_trace: None,
            project_reference: None,
            success_rate: rate,
        }
        .into_record(1, Utc::now());
        r.occurrence_count = occurrences;
        r
    }

    fn signals(text_ratio: f64, shared_tags: usize, success_rate: f64, occurrence_count: u32, category_matches: bool) -> Signals {
        Signals {
            text_ratio,
            shared_tags,
            success_rate,
            occurrence_count,
            category_matches,
        }
    }

    #[test]
    fn test_identical_text_components() {
        let text = "ModuleNotFoundError: No module named 'flask'";
        let fp = extract(text);
        let r = record(text, &["python", "flask", "modulenotfound-error"], 50.0, 1);

        let b = breakdown(text, &fp, &r, false);
        assert_eq!(b.text, 60.0);
        assert_eq!(b.tags, 6.0);
        assert_eq!(b.reliability, 5.0);
        assert!((b.frequency - 2.0).abs() < 1e-9);
        assert!((b.total - 73.0).abs() < 1e-9);

        let with_bonus = score(text, &fp, &r, true);
        assert!((with_bonus - 80.3).abs() < 1e-9);
    }

    #[test]
    fn test_each_term_is_capped() {
        let b = signals(100.0, 25, 100.0, 10_000, false).breakdown();
        assert_eq!(b.tags, TAG_CAP);
        assert_eq!(b.frequency, FREQUENCY_CAP);
        assert_eq!(b.total, 100.0);

        let boosted = signals(100.0, 25, 100.0, 10_000, true).breakdown();
        assert_eq!(boosted.total, MAX_SCORE);
    }

    #[test]
    fn test_category_bonus_alone_cannot_create_a_match() {
        let b = signals(0.0, 0, 0.0, 1, true).breakdown();
        assert!(b.total < 3.0);
    }

    #[test]
    fn test_score_always_in_range() {
        for ratio in [0.0, 12.5, 50.0, 99.0, 100.0] {
            for tags in [0, 3, 10, 40] {
                for rate in [0.0, 50.0, 100.0] {
                    for occ in [1, 2, 31, 5000] {
                        for cat in [false, true] {
                            let t = signals(ratio, tags, rate, occ, cat).breakdown().total;
                            assert!((0.0..=100.0).contains(&t));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_text_ratio() {
        let mut last = f64::MIN;
        for step in 0..=100 {
            let t = signals(step as f64, 4, 80.0, 7, true).breakdown().total;
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_collect_expects_lowered_text() {
        let text = "ModuleNotFoundError: No module named 'Flask'";
        let fp = extract(text);
        let r = record("modulenotfounderror: no module named 'flask'", &[], 50.0, 1);

        let direct = Signals::collect(&text.to_lowercase(), &fp, &r, false);
        assert_eq!(direct.text_ratio, 100.0);
        assert_eq!(direct.breakdown(), breakdown(text, &fp, &r, false));
    }

    #[test]
    fn test_empty_pattern_has_no_text_signal() {
        let fp = extract("anything at all");
        let r = record("", &[], 0.0, 1);
        assert_eq!(breakdown("anything at all", &fp, &r, false).text, 0.0);
    }
}
