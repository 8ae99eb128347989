//! Durable import progress and activity records
//!
//! Both records survive across separate executions: the host enforces a
//! hard wall-clock ceiling per run, so a multi-step import may need several
//! runs to finish. A step name is appended only after that step fully
//! succeeds; the record is the sole source of truth for what to skip when
//! resuming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which named import steps have completed so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub completed_steps: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ImportProgress {
    pub fn new() -> Self {
        Self {
            completed_steps: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_complete(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// Append a completed step. Idempotent: re-marking is a no-op.
    pub fn mark_complete(&mut self, step: &str) {
        if !self.is_complete(step) {
            self.completed_steps.push(step.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.completed_steps.is_empty()
    }
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an import currently holds this document, and when it last
/// proved it was alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveState {
    pub active: bool,
    pub heartbeat_at: DateTime<Utc>,
}

impl ActiveState {
    /// A freshly started (or heartbeating) import.
    pub fn started() -> Self {
        Self {
            active: true,
            heartbeat_at: Utc::now(),
        }
    }

    /// An import that has finished or been cleaned up.
    pub fn cleared() -> Self {
        Self {
            active: false,
            heartbeat_at: Utc::now(),
        }
    }

    /// An active flag whose heartbeat is older than `window` belongs to an
    /// abandoned run and may be reclaimed.
    pub fn is_stale(&self, window: chrono::Duration) -> bool {
        Utc::now() - self.heartbeat_at > window
    }
}
