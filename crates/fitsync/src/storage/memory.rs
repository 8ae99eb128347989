//! In-memory storage implementations
//!
//! Used for tests and as defaults before a host-backed store is wired in.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{AdvisoryLock, KvStore, LockAcquire, Row, RowSink};
use crate::models::EntityId;

/// In-memory implementation of [`KvStore`].
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

/// In-memory implementation of [`RowSink`].
///
/// Rows carrying an `"id"` field are keyed by it (so upserts replace);
/// rows without one are appended to an overflow list.
pub struct InMemoryRowSink {
    rows: RwLock<HashMap<String, Row>>,
    unkeyed: RwLock<Vec<Row>>,
}

impl InMemoryRowSink {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            unkeyed: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len() + self.unkeyed.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.read().unwrap().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Row> {
        self.rows.read().unwrap().get(id).cloned()
    }
}

impl Default for InMemoryRowSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSink for InMemoryRowSink {
    fn upsert(&self, rows: Vec<Row>) -> Result<()> {
        let mut keyed = self.rows.write().unwrap();
        let mut unkeyed = self.unkeyed.write().unwrap();
        for row in rows {
            match row.get("id").and_then(Row::as_str) {
                Some(id) => {
                    keyed.insert(id.to_string(), row);
                }
                None => unkeyed.push(row),
            }
        }
        Ok(())
    }

    fn delete_by_ids(&self, ids: &HashSet<EntityId>) -> Result<()> {
        let mut keyed = self.rows.write().unwrap();
        for id in ids {
            keyed.remove(id.as_str());
        }
        Ok(())
    }
}

/// Process-local advisory lock with a bounded wait.
pub struct InProcessLock {
    held: Mutex<bool>,
}

/// Poll interval while waiting for the lock to free up.
const LOCK_POLL: Duration = Duration::from_millis(50);

impl InProcessLock {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(false),
        }
    }
}

impl Default for InProcessLock {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisoryLock for InProcessLock {
    fn acquire(&self, wait: Duration) -> LockAcquire {
        let deadline = Instant::now() + wait;
        loop {
            {
                let mut held = self.held.lock().unwrap();
                if !*held {
                    *held = true;
                    return LockAcquire::Acquired;
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return LockAcquire::Busy;
            }
            std::thread::sleep(LOCK_POLL.min(remaining));
        }
    }

    fn release(&self) {
        *self.held.lock().unwrap() = false;
    }
}

/// Stand-in for hosts without any lock primitive: every acquisition
/// reports [`LockAcquire::Unavailable`], pushing callers onto the
/// durable-flag fallback.
pub struct UnavailableLock;

impl AdvisoryLock for UnavailableLock {
    fn acquire(&self, _wait: Duration) -> LockAcquire {
        LockAcquire::Unavailable
    }

    fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kv_roundtrip() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("cursor", "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            store.get("cursor").unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );

        store.delete("cursor").unwrap();
        assert_eq!(store.get("cursor").unwrap(), None);
    }

    #[test]
    fn test_sink_upsert_replaces_by_id() {
        let sink = InMemoryRowSink::new();
        sink.upsert(vec![json!({"id": "w1", "title": "Leg day"})])
            .unwrap();
        sink.upsert(vec![json!({"id": "w1", "title": "Leg day (edited)"})])
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("w1").unwrap()["title"], "Leg day (edited)");
    }

    #[test]
    fn test_sink_delete_by_ids() {
        let sink = InMemoryRowSink::new();
        sink.upsert(vec![json!({"id": "w1"}), json!({"id": "w2"})])
            .unwrap();

        let ids: HashSet<EntityId> = [EntityId::new("w1")].into_iter().collect();
        sink.delete_by_ids(&ids).unwrap();

        assert!(!sink.contains("w1"));
        assert!(sink.contains("w2"));
    }

    #[test]
    fn test_lock_mutual_exclusion() {
        let lock = InProcessLock::new();
        assert_eq!(lock.acquire(Duration::ZERO), LockAcquire::Acquired);
        assert_eq!(lock.acquire(Duration::ZERO), LockAcquire::Busy);

        lock.release();
        assert_eq!(lock.acquire(Duration::ZERO), LockAcquire::Acquired);
    }

    #[test]
    fn test_unavailable_lock() {
        let lock = UnavailableLock;
        assert_eq!(lock.acquire(Duration::from_secs(1)), LockAcquire::Unavailable);
    }
}
