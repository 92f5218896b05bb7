//! Record store boundary.
//!
//! The core never reaches for a global database: every operation receives a
//! `RecordStore`. Implementations must apply `update_occurrence` and
//! `update_success_rate` atomically per record.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{Category, ErrorRecord, NewRecord, Status};

pub trait RecordStore {
    /// Insert a new record and return it with its assigned id
    fn create_record(&self, record: NewRecord) -> Result<ErrorRecord>;

    /// Point lookup
    fn get(&self, id: i64) -> Result<Option<ErrorRecord>>;

    /// All records that are not stale, optionally restricted to one category
    fn find_candidates(&self, category: Option<Category>) -> Result<Vec<ErrorRecord>>;

    /// Every record regardless of status
    fn all_records(&self) -> Result<Vec<ErrorRecord>>;

    /// Bump `occurrence_count` (and `similar_count` when `similar`), refresh
    /// `last_seen`. Returns the updated record, `None` if the id is unknown.
    fn update_occurrence(&self, id: i64, similar: bool) -> Result<Option<ErrorRecord>>;

    /// Fold one feedback outcome into `success_rate`. Returns the new rate,
    /// `None` if the id is unknown.
    fn update_success_rate(&self, id: i64, worked: bool) -> Result<Option<f64>>;

    /// Non-stale record whose pattern contains `text` or is contained in it
    /// (case-insensitive), best success rate first, then most occurrences
    fn find_by_substring(&self, text: &str) -> Result<Option<ErrorRecord>>;

    /// Compare-and-set: move the record from `from` to `to`. Returns false if
    /// the id is unknown or its current status is not `from`.
    fn set_status(&self, id: i64, from: Status, to: Status) -> Result<bool>;
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn create_record(&self, record: NewRecord) -> Result<ErrorRecord> {
        (**self).create_record(record)
    }

    fn get(&self, id: i64) -> Result<Option<ErrorRecord>> {
        (**self).get(id)
    }

    fn find_candidates(&self, category: Option<Category>) -> Result<Vec<ErrorRecord>> {
        (**self).find_candidates(category)
    }

    fn all_records(&self) -> Result<Vec<ErrorRecord>> {
        (**self).all_records()
    }

    fn update_occurrence(&self, id: i64, similar: bool) -> Result<Option<ErrorRecord>> {
        (**self).update_occurrence(id, similar)
    }

    fn update_success_rate(&self, id: i64, worked: bool) -> Result<Option<f64>> {
        (**self).update_success_rate(id, worked)
    }

    fn find_by_substring(&self, text: &str) -> Result<Option<ErrorRecord>> {
        (**self).find_by_substring(text)
    }

    fn set_status(&self, id: i64, from: Status, to: Status) -> Result<bool> {
        (**self).set_status(id, from, to)
    }
}
