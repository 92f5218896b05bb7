use super::RecordStore;
use crate::error::Result;
use crate::feedback::next_success_rate;
use crate::types::{Category, ErrorRecord, NewRecord, Status};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, ErrorRecord>,
}

/// Process-local store, used in tests and for throwaway sessions
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed record as-is, keeping its id
    pub fn insert(&self, record: ErrorRecord) {
        let mut inner = self.write();
        inner.next_id = inner.next_id.max(record.id);
        inner.records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // poisoned locks are recovered, every update leaves the map consistent
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RecordStore for InMemoryStore {
    fn create_record(&self, record: NewRecord) -> Result<ErrorRecord> {
        let mut inner = self.write();
        inner.next_id += 1;
        let record = record.into_record(inner.next_id, Utc::now());
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: i64) -> Result<Option<ErrorRecord>> {
        Ok(self.read().records.get(&id).cloned())
    }

    fn find_candidates(&self, category: Option<Category>) -> Result<Vec<ErrorRecord>> {
        Ok(self
            .read()
            .records
            .values()
            .filter(|r| r.status.is_matchable())
            .filter(|r| category.map_or(true, |c| r.category == c))
            .cloned()
            .collect())
    }

    fn all_records(&self) -> Result<Vec<ErrorRecord>> {
        Ok(self.read().records.values().cloned().collect())
    }

    fn update_occurrence(&self, id: i64, similar: bool) -> Result<Option<ErrorRecord>> {
        let mut inner = self.write();
        let Some(record) = inner.records.get_mut(&id) else {
            return Ok(None);
        };

        let now = Utc::now();
        record.occurrence_count = record.occurrence_count.saturating_add(1);
        if similar {
            record.similar_count = record.similar_count.saturating_add(1);
        }
        record.last_seen = now;
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    fn update_success_rate(&self, id: i64, worked: bool) -> Result<Option<f64>> {
        let mut inner = self.write();
        let Some(record) = inner.records.get_mut(&id) else {
            return Ok(None);
        };

        record.success_rate = next_success_rate(record.success_rate, record.occurrence_count, worked);
        record.updated_at = Utc::now();
        Ok(Some(record.success_rate))
    }

    fn find_by_substring(&self, text: &str) -> Result<Option<ErrorRecord>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let inner = self.read();
        let best = inner
            .records
            .values()
            .filter(|r| r.status.is_matchable() && !r.pattern.trim().is_empty())
            .filter(|r| {
                let pattern = r.pattern.to_lowercase();
                needle.contains(&pattern) || pattern.contains(&needle)
            })
            .max_by(|a, b| {
                a.success_rate
                    .partial_cmp(&b.success_rate)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.occurrence_count.cmp(&b.occurrence_count))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned();
        Ok(best)
    }

    fn set_status(&self, id: i64, from: Status, to: Status) -> Result<bool> {
        let mut inner = self.write();
        match inner.records.get_mut(&id) {
            Some(record) if record.status == from => {
                record.status = to;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{normalize_tags, Severity};
    use std::sync::Arc;
    use std::thread;

    fn draft(pattern: &str, category: Category) -> NewRecord {
        NewRecord {
            pattern: pattern.to_string(),
            category,
            severity: Severity::Medium,
            tags: normalize_tags(["test"]),
            solution: "do the thing".to_string(),
            fix_command: None,
            stack_trace: None,
            project_reference: Some(3),
            success_rate: 50.0,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = InMemoryStore::new();
        let a = store.create_record(draft("a", Category::Git)).unwrap();
        let b = store.create_record(draft("b", Category::Git)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.get(a.id).unwrap().unwrap().pattern, "a");
        assert!(store.get(999).unwrap().is_none());
    }

    #[test]
    fn test_candidates_skip_stale_and_filter_category() {
        let store = InMemoryStore::new();
        let a = store.create_record(draft("a", Category::Git)).unwrap();
        store.create_record(draft("b", Category::Npm)).unwrap();
        let c = store.create_record(draft("c", Category::Git)).unwrap();
        store.set_status(c.id, Status::Active, Status::Stale).unwrap();

        let git = store.find_candidates(Some(Category::Git)).unwrap();
        assert_eq!(git.len(), 1);
        assert_eq!(git[0].id, a.id);
        assert_eq!(store.find_candidates(None).unwrap().len(), 2);
        assert_eq!(store.all_records().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_ids_are_reported() {
        let store = InMemoryStore::new();
        assert!(store.update_occurrence(5, false).unwrap().is_none());
        assert!(store.update_success_rate(5, true).unwrap().is_none());
        assert!(!store.set_status(5, Status::Active, Status::Resolved).unwrap());
    }

    #[test]
    fn test_set_status_rejects_outdated_expectation() {
        let store = InMemoryStore::new();
        let id = store.create_record(draft("x", Category::Other)).unwrap().id;

        assert!(store.set_status(id, Status::Active, Status::Stale).unwrap());
        // a second writer still believes the record is active
        assert!(!store.set_status(id, Status::Active, Status::Resolved).unwrap());
        assert_eq!(store.get(id).unwrap().unwrap().status, Status::Stale);
    }

    #[test]
    fn test_find_by_substring_both_directions() {
        let store = InMemoryStore::new();
        let short = store.create_record(draft("Segmentation fault", Category::Other)).unwrap();
        let long = store
            .create_record(draft("fatal: could not read Username for 'https://github.com'", Category::Git))
            .unwrap();
        let stale = store.create_record(draft("disk quota exceeded", Category::Other)).unwrap();
        store.set_status(stale.id, Status::Active, Status::Stale).unwrap();

        let hit = store
            .find_by_substring("python app.py crashed: segmentation FAULT (core dumped)")
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, short.id);

        let hit = store.find_by_substring("could not read Username").unwrap().unwrap();
        assert_eq!(hit.id, long.id);

        assert!(store.find_by_substring("disk quota exceeded").unwrap().is_none());
        assert!(store.find_by_substring("   ").unwrap().is_none());
        assert!(store.find_by_substring("nothing like it").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_occurrences_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.create_record(draft("shared", Category::Other)).unwrap().id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..25 {
                        store.update_occurrence(id, true).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let r = store.get(id).unwrap().unwrap();
        assert_eq!(r.occurrence_count, 201);
        assert_eq!(r.similar_count, 200);
    }
}
