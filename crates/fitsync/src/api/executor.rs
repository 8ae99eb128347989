//! Guarded request execution
//!
//! The only component that performs network I/O. Composes the circuit
//! breaker, retry policy and rate-limit tracker around a single HTTP
//! call: the breaker gates entry, retryable failures back off and retry
//! up to the policy bound, every response's headers feed the tracker, and
//! the final outcome is reported to the breaker exactly once.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::breaker::CircuitBreaker;
use super::rate_limit::RateLimitTracker;
use super::retry::{RetryPolicy, is_retryable_status};
use crate::error::SyncError;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Response-body bytes echoed into an API error before truncation.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound request. Ephemeral, created per call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status, headers and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ApiResponse {
    pub fn read_json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_str(&self.body)
            .map_err(|e| anyhow::anyhow!("failed to parse response body: {e}").into())
    }
}

pub struct RequestExecutor {
    agent: ureq::Agent,
    breaker: CircuitBreaker,
    tracker: RateLimitTracker,
    retry: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(tracker: RateLimitTracker) -> Self {
        Self::with_policy(tracker, RetryPolicy::default(), CircuitBreaker::new())
    }

    pub fn with_policy(
        tracker: RateLimitTracker,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build();
        Self {
            agent: config.into(),
            breaker,
            tracker,
            retry,
        }
    }

    pub fn tracker(&self) -> &RateLimitTracker {
        &self.tracker
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Execute one request under the full guard stack.
    pub fn execute(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, SyncError> {
        self.breaker.check()?;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt - 1);
                log::debug!(
                    "retrying {} (attempt {}/{}) after {:?}",
                    descriptor.url,
                    attempt,
                    self.retry.max_retries,
                    delay
                );
                std::thread::sleep(delay);
            }

            match self.dispatch(descriptor) {
                Ok(response) => {
                    self.tracker.observe(&response.headers);

                    if (200..300).contains(&response.status) {
                        self.breaker.record_success();
                        return Ok(response);
                    }
                    if response.status == 401 {
                        let error = SyncError::InvalidCredential;
                        self.breaker.record_failure(&error);
                        return Err(error);
                    }

                    let error = SyncError::Api {
                        status: response.status,
                        body: truncated(&response.body),
                    };
                    if is_retryable_status(response.status) && attempt < self.retry.max_retries {
                        attempt += 1;
                        continue;
                    }
                    self.breaker.record_failure(&error);
                    return Err(error);
                }
                Err(error) => {
                    if attempt < self.retry.max_retries {
                        attempt += 1;
                        continue;
                    }
                    self.breaker.record_failure(&error);
                    return Err(error);
                }
            }
        }
    }

    /// One transport-level attempt; only `ureq` errors (DNS, connect,
    /// timeout) surface as `Err` here, statuses come back in the response.
    fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, SyncError> {
        let result = match descriptor.method {
            Method::Get => {
                let mut request = self.agent.get(&descriptor.url);
                for (name, value) in &descriptor.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(timeout) = descriptor.timeout {
                    request = request.config().timeout_global(Some(timeout)).build();
                }
                request.call()
            }
            Method::Post => {
                let mut request = self.agent.post(&descriptor.url);
                for (name, value) in &descriptor.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(timeout) = descriptor.timeout {
                    request = request.config().timeout_global(Some(timeout)).build();
                }
                match &descriptor.body {
                    Some(body) => request.send_json(body),
                    None => request.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| SyncError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SyncError::transport(format!("failed to read response body: {e}")))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn truncated(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;
    use std::sync::Arc;

    fn executor_with_fast_retries() -> RequestExecutor {
        let tracker = RateLimitTracker::new(Arc::new(InMemoryKvStore::new()));
        let retry = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        RequestExecutor::with_policy(tracker, retry, CircuitBreaker::new())
    }

    #[test]
    fn test_unreachable_host_surfaces_transport_error() {
        let executor = executor_with_fast_retries();
        let descriptor =
            RequestDescriptor::get("http://127.0.0.1:1/v1/workouts").timeout(Duration::from_millis(250));

        let error = executor.execute(&descriptor).unwrap_err();
        assert!(matches!(error, SyncError::Transport { .. }));
        // The final failure was reported to the breaker.
        assert!(executor.breaker().failure_weight() >= 1.0);
    }

    #[test]
    fn test_open_breaker_skips_the_network() {
        let tracker = RateLimitTracker::new(Arc::new(InMemoryKvStore::new()));
        let breaker = CircuitBreaker::with_params(1.0, Duration::from_secs(60));
        breaker.record_failure(&SyncError::transport("down"));
        let executor =
            RequestExecutor::with_policy(tracker, RetryPolicy::default(), breaker);

        let error = executor
            .execute(&RequestDescriptor::get("http://127.0.0.1:1/v1/workouts"))
            .unwrap_err();
        assert!(matches!(error, SyncError::CircuitOpen { .. }));
    }

    #[test]
    fn test_truncated_caps_long_bodies() {
        let long = "x".repeat(2000);
        let cut = truncated(&long);
        assert!(cut.chars().count() == ERROR_BODY_LIMIT + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(truncated("short"), "short");
    }
}
