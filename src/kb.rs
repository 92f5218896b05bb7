use crate::config::{find_kb_path, KbConfig, Settings, DB_FILE, KB_DIR};
use crate::decision::{DecisionEngine, RecordDraft};
use crate::error::{KbError, Result};
use crate::extract::{extract, fallback_solution};
use crate::feedback::{self, FeedbackOutcome};
use crate::matcher::{self, SearchOptions};
use crate::store::{RecordStore, SqliteStore};
use crate::types::{Category, ErrorRecord, Fingerprint, KbStats, ScoredMatch, Severity, Status};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// An incoming error report
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    pub text: String,
    /// Solution to store if the report ends up creating a record
    pub solution: Option<String>,
    pub project_reference: Option<i64>,
}

impl ErrorReport {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Everything a reporting layer needs to render the result of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub fingerprint: Fingerprint,
    pub record: ErrorRecord,
    pub merged: bool,
    /// Merged through the substring lookup
    pub exact: bool,
    pub score: f64,
    pub related: Vec<ScoredMatch>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordFilter {
    #[default]
    All,
    Category(Category),
    Severity(Severity),
    /// Records carrying any of these tags
    Tags(Vec<String>),
}

const STATUS_ATTEMPTS: usize = 3;

/// The knowledge base interface
pub struct KnowledgeBase<S: RecordStore> {
    store: S,
    settings: Settings,
    engine: DecisionEngine,
}

impl KnowledgeBase<SqliteStore> {
    /// Open the knowledge base for the current project
    pub fn open() -> Result<Self> {
        let kb_path = find_kb_path().ok_or(KbError::NotInitialized)?;
        Self::open_at(&kb_path)
    }

    /// Open a knowledge base directory
    pub fn open_at(kb_path: &Path) -> Result<Self> {
        if !kb_path.exists() {
            return Err(KbError::MissingPath(kb_path.display().to_string()));
        }

        let settings = KbConfig::load(kb_path)?.settings()?;
        let store = SqliteStore::open(&kb_path.join(DB_FILE))?;
        tracing::debug!(path = %kb_path.display(), "opened knowledge base");

        Ok(Self::with_store(store, settings))
    }

    /// Create `.errkb/` under `path` and open it
    pub fn init(path: &Path) -> Result<(Self, PathBuf)> {
        let kb_path = path.join(KB_DIR);
        fs::create_dir_all(&kb_path)?;
        let kb = Self::open_at(&kb_path)?;
        Ok((kb, kb_path))
    }
}

impl<S: RecordStore> KnowledgeBase<S> {
    pub fn with_store(store: S, settings: Settings) -> Self {
        Self {
            store,
            settings,
            engine: DecisionEngine::new(settings.policy),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn related_options(&self) -> SearchOptions {
        SearchOptions {
            category: None,
            limit: self.settings.related_limit,
            min_score: self.settings.related_threshold,
        }
    }

    // =========================================================================
    // Core operations
    // =========================================================================

    /// Fingerprint a report, then merge it into a known record or create one
    pub fn report(&self, report: ErrorReport) -> Result<ReportOutcome> {
        let text = report.text.trim();
        if text.is_empty() {
            return Err(KbError::EmptyReport);
        }

        let fingerprint = extract(text);
        let category = Some(fingerprint.category);
        let best = matcher::best_match(
            &self.store,
            text,
            &fingerprint,
            category,
            self.settings.best_match_threshold,
        )?;
        let options = self.related_options().in_category(fingerprint.category);
        let mut related = matcher::search(&self.store, text, &fingerprint, &options)?;

        let solution = report
            .solution
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback_solution(fingerprint.category).to_string());
        let draft = RecordDraft {
            solution,
            fix_command: None,
            project_reference: report.project_reference,
        };

        let resolution = self
            .engine
            .resolve(&self.store, text, &fingerprint, best.as_ref(), draft)?;

        related.retain(|m| m.record.id != resolution.record.id);

        Ok(ReportOutcome {
            fingerprint,
            record: resolution.record,
            merged: resolution.merged,
            exact: resolution.exact,
            score: resolution.score,
            related,
        })
    }

    /// Related records for free text, read-only
    pub fn search(&self, text: &str, options: Option<SearchOptions>) -> Result<Vec<ScoredMatch>> {
        let fingerprint = extract(text);
        let options = options.unwrap_or_else(|| self.related_options());
        matcher::search(&self.store, text, &fingerprint, &options)
    }

    pub fn best_match(&self, text: &str, category: Option<Category>) -> Result<Option<ScoredMatch>> {
        let fingerprint = extract(text);
        matcher::best_match(
            &self.store,
            text,
            &fingerprint,
            category,
            self.settings.best_match_threshold,
        )
    }

    pub fn feedback(&self, record_id: i64, worked: bool) -> Result<FeedbackOutcome> {
        feedback::apply(&self.store, record_id, worked)
    }

    /// Move a record through its lifecycle. The store write only applies if
    /// the status is still the one the transition was checked against.
    pub fn set_status(&self, record_id: i64, status: Status) -> Result<ErrorRecord> {
        for _ in 0..STATUS_ATTEMPTS {
            let record = self
                .store
                .get(record_id)?
                .ok_or(KbError::RecordNotFound(record_id))?;

            if !record.status.can_transition_to(status) {
                return Err(KbError::InvalidTransition {
                    from: record.status.to_string(),
                    to: status.to_string(),
                });
            }

            if record.status == status {
                return Ok(record);
            }

            if self.store.set_status(record_id, record.status, status)? {
                tracing::info!(record_id, from = %record.status, to = %status, "status changed");
                return self
                    .store
                    .get(record_id)?
                    .ok_or(KbError::RecordNotFound(record_id));
            }

            tracing::debug!(record_id, expected = %record.status, "status changed underneath, rechecking");
        }

        let current = self
            .store
            .get(record_id)?
            .ok_or(KbError::RecordNotFound(record_id))?;
        Err(KbError::InvalidTransition {
            from: current.status.to_string(),
            to: status.to_string(),
        })
    }

    pub fn get(&self, record_id: i64) -> Result<Option<ErrorRecord>> {
        self.store.get(record_id)
    }

    /// List records, ordered per filter
    pub fn list(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<ErrorRecord>> {
        let mut records = self.store.all_records()?;

        match filter {
            RecordFilter::All => {
                records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            }
            RecordFilter::Category(category) => {
                records.retain(|r| r.category == *category);
                records.sort_by(|a, b| {
                    b.occurrence_count.cmp(&a.occurrence_count).then_with(|| {
                        b.success_rate
                            .partial_cmp(&a.success_rate)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                });
            }
            RecordFilter::Severity(severity) => {
                records.retain(|r| r.severity == *severity);
                records.sort_by(|a, b| {
                    b.occurrence_count
                        .cmp(&a.occurrence_count)
                        .then_with(|| b.last_seen.cmp(&a.last_seen))
                });
            }
            RecordFilter::Tags(tags) => {
                let wanted: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
                records.retain(|r| wanted.iter().any(|t| r.tags.contains(t)));
                records.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
            }
        }

        records.truncate(limit);
        Ok(records)
    }

    /// Tag usage counts, most used first
    pub fn tags(&self) -> Result<Vec<(String, usize)>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in self.store.all_records()? {
            for tag in record.tags {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut tags: Vec<(String, usize)> = counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(tags)
    }

    pub fn stats(&self) -> Result<KbStats> {
        Ok(KbStats::from_records(&self.store.all_records()?, Utc::now()))
    }

    /// Every record, newest first
    pub fn export(&self) -> Result<Vec<ErrorRecord>> {
        let mut records = self.store.all_records()?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records)
    }
}
