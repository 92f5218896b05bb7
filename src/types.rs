use crate::error::KbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the number of tags kept per fingerprint or record.
pub const MAX_TAGS: usize = 10;

// -----------------------------------------------------------------------------
// Category
// -----------------------------------------------------------------------------

/// Closed set of error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Python,
    Npm,
    Permission,
    Database,
    Network,
    Dependency,
    Config,
    Git,
    Docker,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Python,
        Category::Npm,
        Category::Permission,
        Category::Database,
        Category::Network,
        Category::Dependency,
        Category::Config,
        Category::Git,
        Category::Docker,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Python => "python",
            Category::Npm => "npm",
            Category::Permission => "permission",
            Category::Database => "database",
            Category::Network => "network",
            Category::Dependency => "dependency",
            Category::Config => "config",
            Category::Git => "git",
            Category::Docker => "docker",
            Category::Other => "other",
        }
    }

    /// Parse, falling back to `other` for anything unrecognised
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Category::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| KbError::InvalidCategory(s.to_string()))
    }
}

// -----------------------------------------------------------------------------
// Severity
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Parse, falling back to `medium` for anything unrecognised
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Severity::Medium)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Severity::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| KbError::InvalidSeverity(s.to_string()))
    }
}

// -----------------------------------------------------------------------------
// Status
// -----------------------------------------------------------------------------

/// Record lifecycle. Stale records are kept for auditing but never matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Resolved,
    Stale,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Active, Status::Resolved, Status::Stale];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Resolved => "resolved",
            Status::Stale => "stale",
        }
    }

    /// Parse, falling back to `active` for anything unrecognised
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Status::Active)
    }

    /// Whether a record in this status takes part in matching
    pub fn is_matchable(&self) -> bool {
        !matches!(self, Status::Stale)
    }

    /// Allowed moves: active -> resolved, active -> stale, resolved -> active.
    /// Re-applying the current status is a no-op and always allowed.
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Active, Status::Resolved)
                | (Status::Active, Status::Stale)
                | (Status::Resolved, Status::Active)
        ) || *self == next
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Status::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| KbError::InvalidStatus(s.to_string()))
    }
}

// -----------------------------------------------------------------------------
// Fingerprint and records
// -----------------------------------------------------------------------------

/// Structured summary extracted from raw error text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub category: Category,
    pub severity: Severity,
    pub tags: BTreeSet<String>,
    pub fix_command: Option<String>,
}

/// A stored, reusable error-and-solution entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: i64,
    pub pattern: String,
    pub category: Category,
    pub severity: Severity,
    pub status: Status,
    pub tags: BTreeSet<String>,
    pub solution: String,
    pub fix_command: Option<String>,
    pub stack_trace: Option<String>,
    pub occurrence_count: u32,
    pub similar_count: u32,
    pub success_rate: f64,
    pub project_reference: Option<i64>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a record; the store fills in id, counters and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub pattern: String,
    pub category: Category,
    pub severity: Severity,
    pub tags: BTreeSet<String>,
    pub solution: String,
    pub fix_command: Option<String>,
    pub stack_trace: Option<String>,
    pub project_reference: Option<i64>,
    pub success_rate: f64,
}

impl NewRecord {
    /// Materialise the record a store would hold right after insertion
    pub fn into_record(self, id: i64, now: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord {
            id,
            pattern: self.pattern,
            category: self.category,
            severity: self.severity,
            status: Status::Active,
            tags: normalize_tags(self.tags),
            solution: self.solution,
            fix_command: self.fix_command,
            stack_trace: self.stack_trace,
            occurrence_count: 1,
            similar_count: 0,
            success_rate: self.success_rate.clamp(0.0, 100.0),
            project_reference: self.project_reference,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lower-case tags and keep at most `MAX_TAGS`, in sorted order
pub fn normalize_tags<I, T>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_TAGS)
        .collect()
}

/// A candidate record paired with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    pub record: ErrorRecord,
    pub score: f64,
}

/// Statistics about the knowledge base
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KbStats {
    pub total: usize,
    pub avg_success_rate: f64,
    pub by_category: BTreeMap<Category, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_status: BTreeMap<Status, usize>,
    pub critical_active: usize,
    pub last_7_days: usize,
}

impl KbStats {
    pub fn from_records(records: &[ErrorRecord], now: DateTime<Utc>) -> Self {
        let mut stats = KbStats {
            total: records.len(),
            ..Default::default()
        };

        if records.is_empty() {
            return stats;
        }

        let week_ago = now - chrono::Duration::days(7);
        let mut rate_sum = 0.0;

        for r in records {
            rate_sum += r.success_rate;
            *stats.by_category.entry(r.category).or_insert(0) += 1;
            *stats.by_severity.entry(r.severity).or_insert(0) += 1;
            *stats.by_status.entry(r.status).or_insert(0) += 1;
            if r.severity == Severity::Critical && r.status == Status::Active {
                stats.critical_active += 1;
            }
            if r.created_at > week_ago {
                stats.last_7_days += 1;
            }
        }

        let avg = rate_sum / records.len() as f64;
        stats.avg_success_rate = (avg * 10.0).round() / 10.0;
        stats
    }
}
