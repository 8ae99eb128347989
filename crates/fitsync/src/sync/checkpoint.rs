//! Durable, resumable import checkpointing
//!
//! The host imposes a hard wall-clock ceiling per execution, so a
//! multi-step import may span several independent runs. The checkpoint
//! record is the sole source of truth for what to skip when resuming:
//! a step name is appended only after the step fully succeeds, and the
//! record is cleared only on full-import success or an explicit restart.
//!
//! Mutual exclusion is primarily the advisory lock with a bounded wait;
//! the durable active flag (with a staleness window) is the fallback when
//! the lock primitive is unavailable.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::models::{ActiveState, ImportProgress};
use crate::storage::{AdvisoryLock, KvStore, LockAcquire};

/// KV key for the completed-steps record.
pub const IMPORT_PROGRESS_STATE: &str = "IMPORT_PROGRESS_STATE";
/// KV key for the active flag + heartbeat.
pub const IMPORT_ACTIVE_STATE: &str = "IMPORT_ACTIVE_STATE";
/// Recommended heartbeat cadence for long-running work.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// Bounded wait for the advisory lock.
const LOCK_WAIT: Duration = Duration::from_secs(30);
/// An active flag with no heartbeat for this long is abandoned.
const STALE_AFTER_MINS: i64 = 10;

/// What the caller chose to do with progress left by a suspended run.
/// The decision is exposed here, never made here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// Skip the steps already completed.
    Resume,
    /// Clear the record and redo everything.
    Restart,
    /// Abort without touching any state.
    Cancel,
}

pub struct ImportCheckpoint {
    store: Arc<dyn KvStore>,
    lock: Arc<dyn AdvisoryLock>,
}

impl ImportCheckpoint {
    pub fn new(store: Arc<dyn KvStore>, lock: Arc<dyn AdvisoryLock>) -> Self {
        Self { store, lock }
    }

    /// Progress left behind by an earlier (suspended) run, if any.
    /// A corrupt record is treated as absent: redoing work is safe,
    /// skipping unfinished work is not.
    pub fn saved_progress(&self) -> Result<Option<ImportProgress>, SyncError> {
        let Some(raw) = self.store.get(IMPORT_PROGRESS_STATE)? else {
            return Ok(None);
        };
        match serde_json::from_str::<ImportProgress>(&raw) {
            Ok(progress) => Ok(Some(progress)),
            Err(error) => {
                log::warn!("discarding unreadable progress record: {}", error);
                Ok(None)
            }
        }
    }

    pub fn clear_progress(&self) -> Result<(), SyncError> {
        self.store.delete(IMPORT_PROGRESS_STATE)?;
        Ok(())
    }

    /// Start an import run. Fails with [`SyncError::AlreadyActive`] when
    /// another run holds this document, either through a live active
    /// flag or by keeping the advisory lock busy for the whole wait.
    pub fn begin(&self) -> Result<ImportSession<'_>, SyncError> {
        if let Some(active) = self.active_state()? {
            if active.active && !active.is_stale(chrono::Duration::minutes(STALE_AFTER_MINS)) {
                return Err(SyncError::AlreadyActive);
            }
            if active.active {
                log::warn!("reclaiming abandoned import (stale heartbeat)");
            }
        }

        match self.lock.acquire(LOCK_WAIT) {
            LockAcquire::Acquired => {}
            LockAcquire::Busy => return Err(SyncError::AlreadyActive),
            LockAcquire::Unavailable => {
                log::warn!("advisory lock unavailable, relying on the active flag alone");
            }
        }

        if let Err(error) = self.write_active(&ActiveState::started()) {
            self.lock.release();
            return Err(error);
        }
        Ok(ImportSession {
            checkpoint: self,
            finished: false,
        })
    }

    fn active_state(&self) -> Result<Option<ActiveState>, SyncError> {
        let Some(raw) = self.store.get(IMPORT_ACTIVE_STATE)? else {
            return Ok(None);
        };
        match serde_json::from_str::<ActiveState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(error) => {
                log::warn!("discarding unreadable active record: {}", error);
                Ok(None)
            }
        }
    }

    fn write_active(&self, state: &ActiveState) -> Result<(), SyncError> {
        let json = serde_json::to_string(state).map_err(anyhow::Error::from)?;
        self.store.set(IMPORT_ACTIVE_STATE, &json)?;
        Ok(())
    }

    fn write_progress(&self, progress: &ImportProgress) -> Result<(), SyncError> {
        let json = serde_json::to_string(progress).map_err(anyhow::Error::from)?;
        self.store.set(IMPORT_PROGRESS_STATE, &json)?;
        Ok(())
    }
}

/// A running import. Holds the active flag and the advisory lock; both
/// are released on [`end`](Self::end) or, failing that, on drop.
pub struct ImportSession<'a> {
    checkpoint: &'a ImportCheckpoint,
    finished: bool,
}

impl std::fmt::Debug for ImportSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportSession")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ImportSession<'_> {
    /// Run one named step unless it already completed or the token has
    /// fired. Returns `Ok(None)` when skipped.
    ///
    /// The durable record is reloaded before appending, so concurrent
    /// executions completing other steps are never overwritten.
    pub fn run_step<T, F>(
        &self,
        name: &str,
        cancel: &CancelToken,
        step: F,
    ) -> Result<Option<T>, SyncError>
    where
        F: FnOnce() -> Result<T, SyncError>,
    {
        let progress = self
            .checkpoint
            .saved_progress()?
            .unwrap_or_default();
        if progress.is_complete(name) {
            log::debug!("step {} already complete, skipping", name);
            return Ok(None);
        }
        if cancel.is_cancelled() {
            log::info!("execution budget exhausted before step {}, skipping", name);
            return Ok(None);
        }

        // Timeouts and failures propagate as-is; progress for the steps
        // that already succeeded is durable already.
        let value = step()?;

        let mut progress = self
            .checkpoint
            .saved_progress()?
            .unwrap_or_default();
        progress.mark_complete(name);
        self.checkpoint.write_progress(&progress)?;
        log::info!("step {} complete", name);
        Ok(Some(value))
    }

    /// Refresh the heartbeat so a concurrent watcher does not consider
    /// this run abandoned.
    pub fn heartbeat(&self) -> Result<(), SyncError> {
        self.checkpoint.write_active(&ActiveState::started())
    }

    /// Finish the run. Success clears the step record; suspension leaves
    /// it for the next execution to resume from. The active flag and the
    /// lock are released either way.
    pub fn end(mut self, success: bool) -> Result<(), SyncError> {
        self.finished = true;
        let result = if success {
            self.checkpoint.clear_progress()
        } else {
            Ok(())
        };
        self.cleanup();
        result
    }

    fn cleanup(&self) {
        if let Err(error) = self.checkpoint.write_active(&ActiveState::cleared()) {
            log::warn!("failed to clear active flag: {}", error);
        }
        self.checkpoint.lock.release();
    }
}

impl Drop for ImportSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cleanup();
        }
    }
}
