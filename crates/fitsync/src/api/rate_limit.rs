//! Server-advertised rate-limit budget tracking
//!
//! Every response carrying `X-RateLimit-*` headers overwrites a cached
//! budget; pagination consults it to slow down before the server starts
//! rejecting requests. The cache has a short TTL - an expired or absent
//! budget means "unknown", never "unlimited".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::storage::KvStore;

/// KV key the current budget is cached under.
const BUDGET_KEY: &str = "RATE_LIMIT_BUDGET";
/// Budgets observed longer ago than this are discarded.
const BUDGET_TTL_SECS: i64 = 600;
/// Throttle when the remaining share of the window drops below this.
const THROTTLE_RATIO: f64 = 0.2;
/// Throttle when fewer than this many requests remain, regardless of ratio.
const THROTTLE_FLOOR: u32 = 50;

/// The server's advertised request budget at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitBudget {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

/// Extracts and caches rate-limit headers; consulted before throttling
/// decisions. Cloneable: all clones share the same backing store.
#[derive(Clone)]
pub struct RateLimitTracker {
    store: Arc<dyn KvStore>,
}

impl RateLimitTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Record rate-limit headers from a response. Responses without them
    /// are a no-op; a store failure degrades to an unknown budget rather
    /// than failing the request that carried the headers.
    pub fn observe(&self, headers: &[(String, String)]) {
        let remaining = header_u32(headers, "x-ratelimit-remaining");
        let limit = header_u32(headers, "x-ratelimit-limit");
        let (Some(remaining), Some(limit)) = (remaining, limit) else {
            return;
        };
        let reset_at = header_i64(headers, "x-ratelimit-reset").map(parse_reset);
        let budget = RateLimitBudget {
            remaining,
            limit,
            reset_at,
            observed_at: Utc::now(),
        };
        match serde_json::to_string(&budget) {
            Ok(json) => {
                if let Err(error) = self.store.set(BUDGET_KEY, &json) {
                    log::warn!("failed to cache rate-limit budget: {}", error);
                }
            }
            Err(error) => log::warn!("failed to encode rate-limit budget: {}", error),
        }
    }

    /// The most recent budget, if one was observed within the TTL.
    pub fn current_budget(&self) -> Option<RateLimitBudget> {
        let json = self.store.get(BUDGET_KEY).ok().flatten()?;
        let budget: RateLimitBudget = serde_json::from_str(&json).ok()?;
        if Utc::now() - budget.observed_at > chrono::Duration::seconds(BUDGET_TTL_SECS) {
            return None;
        }
        Some(budget)
    }

    /// Whether callers should insert an extra delay before the next
    /// request. Unknown budget means no extra throttling.
    pub fn should_throttle(&self) -> bool {
        let Some(budget) = self.current_budget() else {
            return false;
        };
        if budget.remaining < THROTTLE_FLOOR {
            return true;
        }
        budget.limit > 0 && (budget.remaining as f64 / budget.limit as f64) < THROTTLE_RATIO
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

fn header_u32(headers: &[(String, String)], name: &str) -> Option<u32> {
    header_value(headers, name)?.parse().ok()
}

fn header_i64(headers: &[(String, String)], name: &str) -> Option<i64> {
    header_value(headers, name)?.parse().ok()
}

/// Reset values appear in the wild both as epoch seconds and as
/// seconds-until-reset; small values are treated as an offset from now.
fn parse_reset(raw: i64) -> DateTime<Utc> {
    if raw >= 1_000_000_000 {
        DateTime::from_timestamp(raw, 0).unwrap_or_else(Utc::now)
    } else {
        Utc::now() + chrono::Duration::seconds(raw.max(0))
    }
}
