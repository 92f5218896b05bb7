//! Ranks stored records against an incoming report.

use crate::error::Result;
use crate::score::Signals;
use crate::store::RecordStore;
use crate::types::{Category, ErrorRecord, Fingerprint, ScoredMatch};
use std::cmp::Ordering;

pub const DEFAULT_LIMIT: usize = 3;
pub const DEFAULT_MIN_SCORE: f64 = 30.0;
pub const BEST_MATCH_MIN_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Restrict candidates to this category; matching records also get the
    /// category bonus
    pub category: Option<Category>,
    pub limit: usize,
    pub min_score: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            category: None,
            limit: DEFAULT_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl SearchOptions {
    /// Single best candidate at the stricter best-match threshold
    pub fn best(category: Option<Category>) -> Self {
        Self {
            category,
            limit: 1,
            min_score: BEST_MATCH_MIN_SCORE,
        }
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

/// Score, filter and order `candidates`. Stale records are skipped.
pub fn rank(
    text: &str,
    fingerprint: &Fingerprint,
    candidates: Vec<ErrorRecord>,
    options: &SearchOptions,
) -> Vec<ScoredMatch> {
    let lowered = text.to_lowercase();
    let mut results: Vec<ScoredMatch> = candidates
        .into_iter()
        .filter(|r| r.status.is_matchable())
        .filter(|r| options.category.map_or(true, |c| r.category == c))
        .filter_map(|record| {
            let category_matches = options.category == Some(record.category);
            let b = Signals::collect(&lowered, fingerprint, &record, category_matches).breakdown();
            tracing::trace!(
                record_id = record.id,
                text = b.text,
                tags = b.tags,
                reliability = b.reliability,
                frequency = b.frequency,
                category_bonus = b.category_bonus,
                score = b.total,
                "scored candidate"
            );
            (b.total >= options.min_score).then_some(ScoredMatch {
                record,
                score: b.total,
            })
        })
        .collect();

    results.sort_by(compare_matches);
    results.truncate(options.limit);
    results
}

/// Score desc, then occurrence_count desc, then last_seen desc
fn compare_matches(a: &ScoredMatch, b: &ScoredMatch) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.record.occurrence_count.cmp(&a.record.occurrence_count))
        .then_with(|| b.record.last_seen.cmp(&a.record.last_seen))
}

/// Fetch candidates from the store and rank them
pub fn search<S: RecordStore + ?Sized>(
    store: &S,
    text: &str,
    fingerprint: &Fingerprint,
    options: &SearchOptions,
) -> Result<Vec<ScoredMatch>> {
    let candidates = store.find_candidates(options.category)?;
    let total = candidates.len();
    let results = rank(text, fingerprint, candidates, options);

    tracing::debug!(
        candidates = total,
        matched = results.len(),
        min_score = options.min_score,
        "similarity search"
    );
    Ok(results)
}

/// Best single match scoring at least `min_score`
pub fn best_match<S: RecordStore + ?Sized>(
    store: &S,
    text: &str,
    fingerprint: &Fingerprint,
    category: Option<Category>,
    min_score: f64,
) -> Result<Option<ScoredMatch>> {
    let options = SearchOptions {
        min_score,
        ..SearchOptions::best(category)
    };
    Ok(search(store, text, fingerprint, &options)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::store::InMemoryStore;
    use crate::types::{normalize_tags, NewRecord, Severity, Status};
    use chrono::{Duration, Utc};

    fn record(id: i64, pattern: &str, category: Category, occurrences: u32) -> ErrorRecord {
        let mut r = NewRecord {
            pattern: pattern.to_string(),
            category,
            severity: Severity::High,
            tags: normalize_tags(Vec::<String>::new()),
            solution: String::new(),
            fix_command: None,
            stack_trace: None,
            project_reference: None,
            success_rate: 50.0,
        }
        .into_record(id, Utc::now());
        r.occurrence_count = occurrences;
        r
    }

    #[test]
    fn test_rank_orders_by_score() {
        let text = "connection refused on port 5432";
        let fp = extract(text);
        let candidates = vec![
            record(1, "xyzzy", Category::Database, 1),
            record(2, "connection refused on port 5432", Category::Database, 1),
            record(3, "connection refused", Category::Database, 1),
            record(4, "connection reset by peer on port 5432", Category::Database, 1),
        ];

        let results = rank(text, &fp, candidates, &SearchOptions::default());
        assert!(!results.is_empty());
        assert!(results.len() <= DEFAULT_LIMIT);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|m| m.score >= DEFAULT_MIN_SCORE));
        assert!(results.iter().all(|m| m.record.id != 1));
    }

    #[test]
    fn test_ties_broken_by_occurrences_then_recency() {
        let text = "fatal: not a git repository";
        let fp = extract(text);

        let now = Utc::now();
        let mut old = record(1, text, Category::Git, 3);
        old.last_seen = now - Duration::days(3);
        let mut recent = record(2, text, Category::Git, 3);
        recent.last_seen = now;

        let results = rank(
            text,
            &fp,
            vec![old.clone(), recent.clone()],
            &SearchOptions::default(),
        );
        assert_eq!(results[0].score, results[1].score);
        assert_eq!(results[0].record.id, recent.id);

        // occurrence_count beats recency, but it also lifts the frequency term,
        // so compare through the ordering function directly
        let a = ScoredMatch { record: old, score: 80.0 };
        let mut busier = recent;
        busier.occurrence_count = 9;
        busier.last_seen = now - Duration::days(30);
        let b = ScoredMatch { record: busier, score: 80.0 };
        assert_eq!(compare_matches(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_stale_records_never_match() {
        let text = "docker: image not found";
        let fp = extract(text);
        let mut stale = record(1, text, Category::Docker, 1);
        stale.status = Status::Stale;
        let mut resolved = record(2, text, Category::Docker, 1);
        resolved.status = Status::Resolved;

        let results = rank(text, &fp, vec![stale, resolved], &SearchOptions::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, 2);
    }

    #[test]
    fn test_category_filter_and_bonus() {
        let text = "npm ERR! code ERESOLVE unable to resolve dependency tree";
        let fp = extract(text);
        let candidates = vec![
            record(1, text, Category::Npm, 1),
            record(2, text, Category::Other, 1),
        ];

        let unfiltered = rank(text, &fp, candidates.clone(), &SearchOptions::default());
        assert_eq!(unfiltered.len(), 2);

        let filtered = rank(text, &fp, candidates, &SearchOptions::default().in_category(Category::Npm));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].record.id, 1);
        assert!(filtered[0].score > unfiltered.iter().find(|m| m.record.id == 1).unwrap().score);
    }

    #[test]
    fn test_limit_and_empty_store() {
        let store = InMemoryStore::new();
        let fp = extract("anything");
        assert!(search(&store, "anything", &fp, &SearchOptions::default()).unwrap().is_empty());
        assert!(best_match(&store, "anything", &fp, None, BEST_MATCH_MIN_SCORE).unwrap().is_none());

        for i in 0..6 {
            store.insert(record(i + 1, "timeout while reading response", Category::Network, 1));
        }
        let fp = extract("timeout while reading response");
        let results = search(&store, "timeout while reading response", &fp, &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), DEFAULT_LIMIT);

        let best = best_match(&store, "timeout while reading response", &fp, Some(Category::Network), BEST_MATCH_MIN_SCORE)
            .unwrap()
            .unwrap();
        assert!(best.score >= BEST_MATCH_MIN_SCORE);
    }

    #[test]
    fn test_search_is_read_only() {
        let store = InMemoryStore::new();
        store.insert(record(1, "segmentation fault", Category::Other, 4));
        let before = store.all_records().unwrap();

        let fp = extract("segmentation fault");
        search(&store, "segmentation fault", &fp, &SearchOptions::default()).unwrap();
        assert_eq!(store.all_records().unwrap(), before);
    }
}
