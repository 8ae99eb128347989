//! Weighted-failure circuit breaker guarding the request executor
//!
//! Transient server-side rejections (429, 502, 503, 504) count half as
//! much toward the threshold as hard failures, and errors the breaker
//! raised itself count nothing, so an open circuit never reinforces
//! itself. An injectable instance, not a global: tests and independent
//! documents get their own breaker.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::SyncError;

/// Accumulated failure weight at which the circuit opens.
const FAILURE_THRESHOLD: f64 = 5.0;
/// How long the circuit stays open before allowing a probe.
const RESET_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    Closed,
    /// Testing recovery, one probe call allowed.
    HalfOpen,
    /// Failing fast, requests rejected without a network call.
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_weight: f64,
    last_failure_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: f64,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_params(FAILURE_THRESHOLD, RESET_TIMEOUT)
    }

    pub fn with_params(failure_threshold: f64, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_weight: 0.0,
                last_failure_at: None,
            }),
            failure_threshold,
            reset_timeout,
        }
    }

    /// Gate a call. Fails fast while open and inside the reset window;
    /// once the window elapses the circuit moves to half-open and the
    /// next call through is the probe.
    pub fn check(&self) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != CircuitState::Open {
            return Ok(());
        }
        let elapsed = inner
            .last_failure_at
            .map(|at| at.elapsed())
            .unwrap_or(self.reset_timeout);
        if elapsed > self.reset_timeout {
            inner.state = CircuitState::HalfOpen;
            log::info!("circuit breaker half-open, allowing probe");
            return Ok(());
        }
        Err(SyncError::CircuitOpen {
            retry_after: self.reset_timeout - elapsed,
        })
    }

    /// Report a successful outcome: resets the accumulated weight, and a
    /// successful half-open probe closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_weight = 0.0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            log::info!("circuit breaker closed after successful probe");
        }
    }

    /// Report a failed outcome. Weight depends on the failure class; a
    /// failed half-open probe re-opens immediately.
    pub fn record_failure(&self, error: &SyncError) {
        let weight = failure_weight(error);
        if weight == 0.0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.failure_weight += weight;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                log::warn!("circuit breaker probe failed, re-opening");
            }
            CircuitState::Closed if inner.failure_weight >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                log::warn!(
                    "circuit breaker opened at failure weight {:.1}",
                    inner.failure_weight
                );
            }
            _ => {}
        }
    }

    /// Stored state as of the last transition. Open-to-half-open happens
    /// lazily inside [`check`](Self::check), not here.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn failure_weight(&self) -> f64 {
        self.inner.lock().unwrap().failure_weight
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Breaker-raised errors contribute nothing; throttling and transient
/// 5xx rejections contribute half; everything else a full point.
fn failure_weight(error: &SyncError) -> f64 {
    match error {
        SyncError::CircuitOpen { .. } => 0.0,
        SyncError::Api {
            status: 429 | 502 | 503 | 504,
            ..
        } => 0.5,
        _ => 1.0,
    }
}
