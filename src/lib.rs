//! Error fingerprinting and an adaptive knowledge base of solutions.
//!
//! Raw error text is reduced to a [`Fingerprint`], matched against stored
//! [`ErrorRecord`]s, and either merged into a known record or stored as a new
//! one. Feedback on whether a solution worked moves the record's success rate.

pub mod config;
pub mod decision;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod fuzzy;
pub mod kb;
pub mod matcher;
pub mod score;
pub mod store;
pub mod types;

pub use config::Settings;
pub use error::{KbError, Result};
pub use extract::extract;
pub use feedback::FeedbackOutcome;
pub use kb::{ErrorReport, KnowledgeBase, RecordFilter, ReportOutcome};
pub use matcher::SearchOptions;
pub use store::{InMemoryStore, RecordStore, SqliteStore};
pub use types::{Category, ErrorRecord, Fingerprint, KbStats, ScoredMatch, Severity, Status};
