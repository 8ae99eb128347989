//! Cooperative cancellation for long-running sync loops
//!
//! The host grants a hard wall-clock budget per execution. Work checks the
//! token at the top of each loop round (page batch, fetch round, import
//! step); requests already in flight are allowed to finish so the sink
//! never sees a half-written page.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::SyncError;

/// Cancellation token checked at loop boundaries.
///
/// Cheap to clone; all clones observe the same cancellation.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires on its own.
    pub fn never() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that fires once `budget` wall-clock time has elapsed.
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + budget),
            }),
        }
    }

    /// Request cancellation explicitly.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Check the token, surfacing the number of items already processed
    /// so a suspended run reports what it committed.
    pub fn check(&self, processed: u64) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Timeout { processed })
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_token_stays_live() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        assert!(token.check(0).is_ok());
    }

    #[test]
    fn test_explicit_cancel_fires_all_clones() {
        let token = CancelToken::never();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_exhausted_budget_cancels() {
        let token = CancelToken::with_budget(Duration::ZERO);
        assert!(token.is_cancelled());
        match token.check(42) {
            Err(SyncError::Timeout { processed }) => assert_eq!(processed, 42),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_generous_budget_not_yet_cancelled() {
        let token = CancelToken::with_budget(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
