//! Merge-or-create: attach a report to a known record, or start a new one.

use crate::error::Result;
use crate::store::RecordStore;
use crate::types::{ErrorRecord, Fingerprint, NewRecord, ScoredMatch};
use serde::Serialize;

pub const DEFAULT_MERGE_THRESHOLD: f64 = 70.0;
/// No outcome has been observed for a new record yet
pub const DEFAULT_INITIAL_SUCCESS_RATE: f64 = 50.0;
pub const DEFAULT_PATTERN_MAX_CHARS: usize = 100;
pub const DEFAULT_STACK_TRACE_MIN_CHARS: usize = 200;
/// Score reported for a merge found by substring lookup
pub const EXACT_MATCH_SCORE: f64 = 100.0;

/// Constants governing merge and creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub merge_threshold: f64,
    pub initial_success_rate: f64,
    pub pattern_max_chars: usize,
    pub stack_trace_min_chars: usize,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            initial_success_rate: DEFAULT_INITIAL_SUCCESS_RATE,
            pattern_max_chars: DEFAULT_PATTERN_MAX_CHARS,
            stack_trace_min_chars: DEFAULT_STACK_TRACE_MIN_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Merge { record_id: i64, score: f64 },
    Create { best_score: f64 },
}

/// Merge iff there is a best match scoring at least `merge_threshold`
pub fn decide(best: Option<&ScoredMatch>, merge_threshold: f64) -> Decision {
    match best {
        Some(m) if m.score >= merge_threshold => Decision::Merge {
            record_id: m.record.id,
            score: m.score,
        },
        Some(m) => Decision::Create { best_score: m.score },
        None => Decision::Create { best_score: 0.0 },
    }
}

/// A report is a literal repeat when either side contains the other
/// (trimmed, case-insensitive); anything else counts as a variant.
pub fn is_variant(text: &str, pattern: &str) -> bool {
    let text = text.trim().to_lowercase();
    let pattern = pattern.trim().to_lowercase();
    if text.is_empty() || pattern.is_empty() {
        return true;
    }
    !(pattern.contains(&text) || text.contains(&pattern))
}

/// What the engine did with a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub record: ErrorRecord,
    pub merged: bool,
    /// Merged through the substring lookup rather than fuzzy scoring
    pub exact: bool,
    /// Score that justified the decision (best candidate's score, or 0)
    pub score: f64,
}

/// Caller-supplied fields for a record that may need to be created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub solution: String,
    pub fix_command: Option<String>,
    pub project_reference: Option<i64>,
}

pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Apply the merge-or-create rule against the store. Below the merge
    /// threshold a record whose pattern and the text contain one another is
    /// still merged, regardless of category.
    pub fn resolve<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        text: &str,
        fingerprint: &Fingerprint,
        best: Option<&ScoredMatch>,
        draft: RecordDraft,
    ) -> Result<Resolution> {
        let best_score = match decide(best, self.policy.merge_threshold) {
            Decision::Merge { record_id, score } => {
                let pattern = best.map(|m| m.record.pattern.as_str()).unwrap_or_default();
                let similar = is_variant(text, pattern);

                match store.update_occurrence(record_id, similar)? {
                    Some(record) => {
                        tracing::info!(
                            record_id,
                            score,
                            similar,
                            occurrences = record.occurrence_count,
                            "merged report into existing record"
                        );
                        return Ok(Resolution {
                            record,
                            merged: true,
                            exact: false,
                            score,
                        });
                    }
                    None => {
                        tracing::warn!(record_id, "matched record vanished before merge, creating new record");
                        score
                    }
                }
            }
            Decision::Create { best_score } => best_score,
        };

        if let Some(known) = store.find_by_substring(text)? {
            if let Some(record) = store.update_occurrence(known.id, false)? {
                tracing::info!(
                    record_id = record.id,
                    best_score,
                    occurrences = record.occurrence_count,
                    "merged report through substring lookup"
                );
                return Ok(Resolution {
                    record,
                    merged: true,
                    exact: true,
                    score: EXACT_MATCH_SCORE,
                });
            }
        }

        let record = store.create_record(self.seed_record(text, fingerprint, draft))?;
        tracing::info!(
            record_id = record.id,
            category = %record.category,
            best_score,
            "created new record"
        );

        Ok(Resolution {
            record,
            merged: false,
            exact: false,
            score: best_score,
        })
    }

    /// Build the creation payload from the report and its fingerprint
    pub fn seed_record(&self, text: &str, fingerprint: &Fingerprint, draft: RecordDraft) -> NewRecord {
        let trimmed = text.trim();
        let pattern: String = trimmed.chars().take(self.policy.pattern_max_chars).collect();
        let stack_trace = (trimmed.chars().count() > self.policy.stack_trace_min_chars)
            .then(|| trimmed.to_string());

        NewRecord {
            pattern,
            category: fingerprint.category,
            severity: fingerprint.severity,
            tags: fingerprint.tags.clone(),
            solution: draft.solution,
            fix_command: draft.fix_command.or_else(|| fingerprint.fix_command.clone()),
            stack_trace,
            project_reference: draft.project_reference,
            success_rate: self.policy.initial_success_rate,
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionPolicy::default())
    }
}
