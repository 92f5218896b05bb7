use super::RecordStore;
use crate::error::Result;
use crate::feedback::next_success_rate;
use crate::types::{normalize_tags, Category, ErrorRecord, NewRecord, Severity, Status};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'other',
    severity TEXT NOT NULL DEFAULT 'medium',
    status TEXT NOT NULL DEFAULT 'active',
    solution TEXT NOT NULL,
    fix_command TEXT,
    stack_trace TEXT,
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    similar_count INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 50,
    project_reference INTEGER,
    last_seen TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    record_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (record_id, tag),
    FOREIGN KEY (record_id) REFERENCES records(id)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);
CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);
CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
CREATE INDEX IF NOT EXISTS idx_records_severity ON records(severity);
CREATE INDEX IF NOT EXISTS idx_records_project ON records(project_reference);
"#;

const COLUMNS: &str = "id, pattern, category, severity, status, solution, fix_command, stack_trace, \
     occurrence_count, similar_count, success_rate, project_reference, last_seen, created_at, updated_at";

/// Record store backed by SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the record database
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %db_path.display(), "opened record store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -------------------------------------------------------------------------
    // Row mapping
    // -------------------------------------------------------------------------

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ErrorRecord> {
        Ok(ErrorRecord {
            id: row.get(0)?,
            pattern: row.get(1)?,
            category: row.get(2)?,
            severity: row.get(3)?,
            status: row.get(4)?,
            tags: BTreeSet::new(),
            solution: row.get(5)?,
            fix_command: row.get(6)?,
            stack_trace: row.get(7)?,
            occurrence_count: row.get(8)?,
            similar_count: row.get(9)?,
            success_rate: row.get(10)?,
            project_reference: row.get(11)?,
            last_seen: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn get_tags(conn: &Connection, record_id: i64) -> rusqlite::Result<BTreeSet<String>> {
        let mut stmt = conn.prepare_cached("SELECT tag FROM tags WHERE record_id = ?1")?;
        let tags = stmt
            .query_map(params![record_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(tags)
    }

    fn get_locked(conn: &Connection, id: i64) -> rusqlite::Result<Option<ErrorRecord>> {
        let sql = format!("SELECT {} FROM records WHERE id = ?1", COLUMNS);
        let record = conn.query_row(&sql, params![id], Self::map_row).optional()?;

        match record {
            Some(mut r) => {
                r.tags = Self::get_tags(conn, r.id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    fn query_records(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> rusqlite::Result<Vec<ErrorRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let mut records = stmt
            .query_map(args, Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for r in &mut records {
            r.tags = Self::get_tags(conn, r.id)?;
        }

        Ok(records)
    }
}

impl RecordStore for SqliteStore {
    fn create_record(&self, record: NewRecord) -> Result<ErrorRecord> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now();
        let tags = normalize_tags(&record.tags);

        tx.execute(
            "INSERT INTO records (pattern, category, severity, status, solution, fix_command, stack_trace,
                                  occurrence_count, similar_count, success_rate, project_reference,
                                  last_seen, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, 1, 0, ?7, ?8, ?9, ?9, ?9)",
            params![
                record.pattern,
                record.category,
                record.severity,
                record.solution,
                record.fix_command,
                record.stack_trace,
                record.success_rate.clamp(0.0, 100.0),
                record.project_reference,
                now,
            ],
        )?;

        let id = tx.last_insert_rowid();

        for tag in &tags {
            tx.execute(
                "INSERT OR IGNORE INTO tags (record_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }

        tx.commit()?;

        let created = Self::get_locked(&conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(created)
    }

    fn get(&self, id: i64) -> Result<Option<ErrorRecord>> {
        let conn = self.lock();
        Ok(Self::get_locked(&conn, id)?)
    }

    fn find_candidates(&self, category: Option<Category>) -> Result<Vec<ErrorRecord>> {
        let conn = self.lock();
        let records = match category {
            Some(c) => Self::query_records(
                &conn,
                &format!(
                    "SELECT {} FROM records WHERE category = ?1 AND status != 'stale' ORDER BY occurrence_count DESC",
                    COLUMNS
                ),
                &[&c],
            )?,
            None => Self::query_records(
                &conn,
                &format!(
                    "SELECT {} FROM records WHERE status != 'stale' ORDER BY occurrence_count DESC",
                    COLUMNS
                ),
                &[],
            )?,
        };
        Ok(records)
    }

    fn all_records(&self) -> Result<Vec<ErrorRecord>> {
        let conn = self.lock();
        let sql = format!("SELECT {} FROM records ORDER BY id", COLUMNS);
        Ok(Self::query_records(&conn, &sql, &[])?)
    }

    fn update_occurrence(&self, id: i64, similar: bool) -> Result<Option<ErrorRecord>> {
        let conn = self.lock();
        let now = chrono::Utc::now();

        let changed = conn.execute(
            "UPDATE records
             SET occurrence_count = occurrence_count + 1,
                 similar_count = similar_count + ?1,
                 last_seen = ?2,
                 updated_at = ?2
             WHERE id = ?3",
            params![similar as i64, now, id],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        Ok(Self::get_locked(&conn, id)?)
    }

    fn update_success_rate(&self, id: i64, worked: bool) -> Result<Option<f64>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let current: Option<(f64, u32)> = tx
            .query_row(
                "SELECT success_rate, occurrence_count FROM records WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((old_rate, occurrences)) = current else {
            return Ok(None);
        };

        let new_rate = next_success_rate(old_rate, occurrences, worked);
        tx.execute(
            "UPDATE records SET success_rate = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_rate, chrono::Utc::now(), id],
        )?;
        tx.commit()?;

        Ok(Some(new_rate))
    }

    fn find_by_substring(&self, text: &str) -> Result<Option<ErrorRecord>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM records
             WHERE status != 'stale' AND pattern != ''
               AND (instr(?1, lower(pattern)) > 0 OR instr(lower(pattern), ?1) > 0)
             ORDER BY success_rate DESC, occurrence_count DESC, id ASC
             LIMIT 1",
            COLUMNS
        );
        Ok(Self::query_records(&conn, &sql, &[&needle])?.into_iter().next())
    }

    fn set_status(&self, id: i64, from: Status, to: Status) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE records SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to, chrono::Utc::now(), id, from],
        )?;
        Ok(changed > 0)
    }
}

// -----------------------------------------------------------------------------
// Enum <-> TEXT column conversions
// -----------------------------------------------------------------------------

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(Category);
text_enum_sql!(Severity);
text_enum_sql!(Status);

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(pattern: &str, category: Category, tags: &[&str]) -> NewRecord {
        NewRecord {
            pattern: pattern.to_string(),
            category,
            severity: Severity::High,
            tags: normalize_tags(tags),
            solution: "Install the module".to_string(),
            fix_command: Some("pip install flask".to_string()),
            stack_trace: None,
            project_reference: Some(42),
            success_rate: 50.0,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SqliteStore::in_memory().unwrap();

        let created = store
            .create_record(draft("No module named flask", Category::Python, &["Python", "flask"]))
            .unwrap();

        let r = store.get(created.id).unwrap().unwrap();
        assert_eq!(r.pattern, "No module named flask");
        assert_eq!(r.category, Category::Python);
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.status, Status::Active);
        assert_eq!(r.tags.iter().cloned().collect::<Vec<_>>(), vec!["flask", "python"]);
        assert_eq!(r.fix_command.as_deref(), Some("pip install flask"));
        assert_eq!(r.occurrence_count, 1);
        assert_eq!(r.similar_count, 0);
        assert_eq!(r.success_rate, 50.0);
        assert_eq!(r.project_reference, Some(42));
        assert_eq!(r, created);
    }

    #[test]
    fn test_candidates_exclude_stale() {
        let store = SqliteStore::in_memory().unwrap();

        let a = store.create_record(draft("a", Category::Git, &[])).unwrap();
        let b = store.create_record(draft("b", Category::Git, &[])).unwrap();
        store.create_record(draft("c", Category::Docker, &[])).unwrap();

        store.set_status(b.id, Status::Active, Status::Stale).unwrap();

        let git = store.find_candidates(Some(Category::Git)).unwrap();
        assert_eq!(git.len(), 1);
        assert_eq!(git[0].id, a.id);

        assert_eq!(store.find_candidates(None).unwrap().len(), 2);
        assert_eq!(store.all_records().unwrap().len(), 3);
    }

    #[test]
    fn test_update_occurrence() {
        let store = SqliteStore::in_memory().unwrap();
        let r = store.create_record(draft("x", Category::Other, &[])).unwrap();

        let once = store.update_occurrence(r.id, false).unwrap().unwrap();
        assert_eq!(once.occurrence_count, 2);
        assert_eq!(once.similar_count, 0);
        assert!(once.last_seen >= r.last_seen);

        let twice = store.update_occurrence(r.id, true).unwrap().unwrap();
        assert_eq!(twice.occurrence_count, 3);
        assert_eq!(twice.similar_count, 1);

        assert!(store.update_occurrence(9999, true).unwrap().is_none());
    }

    #[test]
    fn test_update_success_rate() {
        let store = SqliteStore::in_memory().unwrap();
        let r = store.create_record(draft("x", Category::Other, &[])).unwrap();

        assert_eq!(store.update_success_rate(r.id, true).unwrap(), Some(100.0));
        store.update_occurrence(r.id, false).unwrap();
        assert_eq!(store.update_success_rate(r.id, false).unwrap(), Some(50.0));
        assert_eq!(store.get(r.id).unwrap().unwrap().success_rate, 50.0);

        assert_eq!(store.update_success_rate(12345, true).unwrap(), None);
    }

    #[test]
    fn test_set_status_is_compare_and_set() {
        let store = SqliteStore::in_memory().unwrap();
        let r = store.create_record(draft("x", Category::Other, &[])).unwrap();

        assert!(store.set_status(r.id, Status::Active, Status::Stale).unwrap());
        assert!(!store.set_status(r.id, Status::Active, Status::Resolved).unwrap());
        assert_eq!(store.get(r.id).unwrap().unwrap().status, Status::Stale);
        assert!(!store.set_status(777, Status::Active, Status::Resolved).unwrap());
    }

    #[test]
    fn test_find_by_substring() {
        let store = SqliteStore::in_memory().unwrap();
        let seg = store.create_record(draft("Segmentation fault", Category::Other, &[])).unwrap();
        let mut better = draft("segmentation fault (core dumped)", Category::Other, &[]);
        better.success_rate = 90.0;
        let better = store.create_record(better).unwrap();

        // both contained in the text, higher success rate wins
        let hit = store
            .find_by_substring("python app.py crashed: Segmentation fault (core dumped)")
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, better.id);

        store.set_status(better.id, Status::Active, Status::Stale).unwrap();
        let hit = store.find_by_substring("SEGMENTATION").unwrap().unwrap();
        assert_eq!(hit.id, seg.id);

        assert!(store.find_by_substring("no overlap here").unwrap().is_none());
        assert!(store.find_by_substring("").unwrap().is_none());
    }

    #[test]
    fn test_on_disk_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("records.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            store.create_record(draft("persisted", Category::Npm, &["npm"])).unwrap().id
        };

        let reopened = SqliteStore::open(&path).unwrap();
        let r = reopened.get(id).unwrap().unwrap();
        assert_eq!(r.pattern, "persisted");
        assert!(r.tags.contains("npm"));
    }
}
