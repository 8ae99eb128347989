//! Bounded-concurrency entity fetching with partial-failure thresholds
//!
//! The change log carries ids, not bodies, so upserts need one fetch per
//! entity. Items are fetched in bounded rounds, each failed item retried
//! a couple of times, and the aggregate outcome is judged afterwards: an
//! import cannot proceed on essentially zero data, and a majority-failed
//! batch is too unreliable to trust.

use rayon::prelude::*;

use crate::api::{CollectionApi, Endpoint, RetryPolicy};
use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::models::EntityId;
use crate::storage::Row;

/// Entities fetched concurrently per round.
pub const BATCH_SIZE: usize = 100;
/// Extra attempts per item after the first.
pub const RETRY_ATTEMPTS: u32 = 2;
/// Abort when more than this share of items failed (strictly greater).
pub const FAILURE_THRESHOLD: f64 = 0.5;
/// Fail hard when fewer items than this succeeded.
pub const MIN_SUCCESS_COUNT: usize = 1;
/// Failed IDs spelled out in the diagnostic log before capping.
const LOGGED_FAILURES: usize = 50;

/// Outcome of a batch fetch. `succeeded` preserves input order.
#[derive(Debug, Default)]
pub struct BatchFetchResult {
    pub succeeded: Vec<Row>,
    pub failed_ids: Vec<EntityId>,
}

pub struct BatchFetcher<'a> {
    source: &'a dyn CollectionApi,
    retry: RetryPolicy,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(source: &'a dyn CollectionApi) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every id, in bounded rounds. Credential and circuit-breaker
    /// failures abort immediately; everything else lands in `failed_ids`
    /// and is judged against the thresholds at the end.
    pub fn fetch_all(
        &self,
        endpoint: Endpoint,
        ids: &[EntityId],
        cancel: &CancelToken,
    ) -> Result<BatchFetchResult, SyncError> {
        if ids.is_empty() {
            return Ok(BatchFetchResult::default());
        }

        let mut succeeded = Vec::with_capacity(ids.len());
        let mut failed_ids = Vec::new();
        let mut processed: u64 = 0;

        for round in ids.chunks(BATCH_SIZE) {
            cancel.check(processed)?;
            let results: Vec<Result<Row, SyncError>> = round
                .par_iter()
                .map(|id| self.fetch_one(endpoint, id))
                .collect();
            for (id, result) in round.iter().zip(results) {
                processed += 1;
                match result {
                    Ok(row) => succeeded.push(row),
                    Err(error @ (SyncError::InvalidCredential | SyncError::CircuitOpen { .. })) => {
                        return Err(error);
                    }
                    Err(error) => {
                        log::debug!(
                            "fetch of {} {} failed: {}",
                            endpoint.path,
                            id.as_str(),
                            error
                        );
                        failed_ids.push(id.clone());
                    }
                }
            }
        }

        self.judge(endpoint, ids.len(), succeeded, failed_ids)
    }

    fn fetch_one(&self, endpoint: Endpoint, id: &EntityId) -> Result<Row, SyncError> {
        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(self.retry.delay_for_attempt(attempt - 1));
            }
            match self.source.get_entity(endpoint, id) {
                Ok(row) => return Ok(row),
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SyncError::transport("retry loop exhausted")))
    }

    fn judge(
        &self,
        endpoint: Endpoint,
        total: usize,
        succeeded: Vec<Row>,
        failed_ids: Vec<EntityId>,
    ) -> Result<BatchFetchResult, SyncError> {
        if succeeded.len() < MIN_SUCCESS_COUNT {
            return Err(SyncError::validation(format!(
                "batch fetch of {} returned no usable data ({} of {} items failed)",
                endpoint.path,
                failed_ids.len(),
                total
            )));
        }

        let failed = failed_ids.len();
        if failed > 1 && failed as f64 / total as f64 > FAILURE_THRESHOLD {
            return Err(SyncError::validation(format!(
                "batch fetch of {} too unreliable: {} of {} items failed",
                endpoint.path, failed, total
            )));
        }

        if failed > 0 {
            let shown: Vec<&str> = failed_ids
                .iter()
                .take(LOGGED_FAILURES)
                .map(EntityId::as_str)
                .collect();
            if failed > LOGGED_FAILURES {
                log::warn!(
                    "{} of {} {} items failed, first {}: {:?} (+{} more)",
                    failed,
                    total,
                    endpoint.path,
                    LOGGED_FAILURES,
                    shown,
                    failed - LOGGED_FAILURES
                );
            } else {
                log::warn!(
                    "{} of {} {} items failed: {:?}",
                    failed,
                    total,
                    endpoint.path,
                    shown
                );
            }
        }

        Ok(BatchFetchResult {
            succeeded,
            failed_ids,
        })
    }
}
