//! Success-rate learning from "did the solution work?" feedback.

use crate::error::Result;
use crate::store::RecordStore;
use serde::Serialize;

/// Result of applying one piece of feedback
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Updated { record_id: i64, success_rate: f64 },
    NotFound { record_id: i64 },
}

/// Count-weighted moving average:
/// `((old * (n - 1)) + (100 | 0)) / n` with `n = occurrence_count`.
///
/// A record seen once takes the latest outcome outright; a record seen many
/// times moves slowly.
pub fn next_success_rate(old_rate: f64, occurrence_count: u32, worked: bool) -> f64 {
    let n = occurrence_count.max(1) as f64;
    let outcome = if worked { 100.0 } else { 0.0 };
    let rate = (old_rate.clamp(0.0, 100.0) * (n - 1.0) + outcome) / n;
    rate.clamp(0.0, 100.0)
}

/// Record feedback for `record_id`. Unknown ids are a non-fatal `NotFound`.
pub fn apply<S: RecordStore + ?Sized>(store: &S, record_id: i64, worked: bool) -> Result<FeedbackOutcome> {
    match store.update_success_rate(record_id, worked)? {
        Some(success_rate) => {
            tracing::info!(record_id, worked, success_rate, "feedback recorded");
            Ok(FeedbackOutcome::Updated {
                record_id,
                success_rate,
            })
        }
        None => {
            tracing::warn!(record_id, "feedback for unknown record");
            Ok(FeedbackOutcome::NotFound { record_id })
        }
    }
}
