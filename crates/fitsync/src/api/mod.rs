//! HTTP layer for the workout-tracking API
//!
//! This module provides:
//! - A guarded request executor (retry + circuit breaker + rate limiting)
//! - The endpoint client, pagination cursors and the fetch trait the
//!   sync orchestrators depend on

mod breaker;
mod client;
mod executor;
mod rate_limit;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{
    ApiClient, CollectionApi, DEFAULT_BASE_URL, Endpoint, PageCursor, PageData, endpoints,
};
pub use executor::{ApiResponse, Method, RequestDescriptor, RequestExecutor};
pub use rate_limit::{RateLimitBudget, RateLimitTracker};
pub use retry::{RETRYABLE_STATUSES, RetryPolicy, is_retryable_status};
