//! Storage trait definitions

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;

use crate::models::EntityId;

/// A parsed row as handed to the tabular sink.
///
/// The sink owns the schema; this core only promises JSON objects carrying
/// an `"id"` field where the endpoint provides one.
pub type Row = serde_json::Value;

/// Minimal key-value persistence for durable sync state.
///
/// Holds the import checkpoint, the rate-limit budget cache and the
/// per-entity-type sync cursors.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// The tabular sink that receives parsed rows.
pub trait RowSink: Send + Sync {
    /// Insert or merge rows; merge semantics are owned by the sink.
    fn upsert(&self, rows: Vec<Row>) -> Result<()>;

    /// Remove the rows for the given entity ids, if present.
    fn delete_by_ids(&self, ids: &HashSet<EntityId>) -> Result<()>;
}

/// Outcome of an advisory-lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquire {
    Acquired,
    /// Another holder kept the lock for the whole wait window.
    Busy,
    /// The lock primitive itself is unavailable on this host; callers
    /// fall back to the durable active flag.
    Unavailable,
}

/// Advisory mutual exclusion for import runs.
///
/// Multiple independent executions (separated by the host's forced
/// suspension) can race to resume the same import; this is the primary
/// guard, with the durable active flag as the fallback signal.
pub trait AdvisoryLock: Send + Sync {
    /// Try to take the lock, waiting up to `wait` for it to free up.
    fn acquire(&self, wait: Duration) -> LockAcquire;

    /// Release the lock if held. Must be safe to call when not held.
    fn release(&self);
}
