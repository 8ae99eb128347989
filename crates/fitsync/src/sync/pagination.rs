//! Page-walking orchestration over a collection endpoint
//!
//! Pages are fetched in bounded batches fanned out together, but their
//! results are consumed strictly in page order, so concurrent fetch never
//! reorders output. Four things end a walk: a short page, server page
//! count metadata, a 404 (exhausted), or the hard page ceiling - the last
//! one is an inconsistency, never silent truncation.

use rayon::prelude::*;
use std::time::Duration;

use crate::api::{CollectionApi, Endpoint, PageCursor, PageData, RateLimitTracker};
use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::storage::Row;

/// Hard ceiling guarding against endpoint inconsistency.
pub const MAX_PAGES: u32 = 10_000;
/// Pages fetched together per batch.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Extra pause when the server budget is running low.
const THROTTLE_DELAY: Duration = Duration::from_millis(100);
/// Default pause between page batches.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(25);
/// Pause before re-requesting a page that was rejected with 429.
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(1);

pub struct Paginator<'a> {
    source: &'a dyn CollectionApi,
    tracker: RateLimitTracker,
    concurrency: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn CollectionApi, tracker: RateLimitTracker) -> Self {
        Self {
            source,
            tracker,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sequential fetch is just a batch of one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Walk every page of `endpoint`, handing each page's items to
    /// `sink`. Returns the total number of items processed.
    ///
    /// Cancellation is polled at the top of every batch round; pages
    /// already in flight finish first, and the error carries the count
    /// of items already handed to the sink.
    pub fn walk<F>(
        &self,
        endpoint: Endpoint,
        page_size: u32,
        extra_params: Vec<(String, String)>,
        cancel: &CancelToken,
        mut sink: F,
    ) -> Result<u64, SyncError>
    where
        F: FnMut(Vec<Row>) -> anyhow::Result<()>,
    {
        let mut total: u64 = 0;
        let mut next_page: u32 = 1;

        loop {
            cancel.check(total)?;
            if next_page > MAX_PAGES {
                return Err(SyncError::validation(format!(
                    "pagination for {} exceeded {} pages after {} items; endpoint metadata is inconsistent",
                    endpoint.path, MAX_PAGES, total
                )));
            }
            if next_page > 1 {
                self.pace();
            }

            let batch_end = next_page
                .saturating_add(self.concurrency as u32)
                .min(MAX_PAGES + 1);
            let pages: Vec<u32> = (next_page..batch_end).collect();
            let results = self.fetch_batch(endpoint, &pages, page_size, &extra_params);

            for (page, result) in pages.iter().zip(results) {
                let data = match result {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        log::debug!("{} exhausted at page {}", endpoint.path, page);
                        return Ok(total);
                    }
                    Err(error) => {
                        log::warn!("page {} of {} failed: {}", page, endpoint.path, error);
                        return Err(error);
                    }
                };

                let count = data.items.len();
                if count > 0 {
                    sink(data.items)?;
                    total += count as u64;
                }
                if (count as u32) < page_size {
                    return Ok(total);
                }
                if let Some(page_count) = data.page_count {
                    if *page >= page_count {
                        return Ok(total);
                    }
                }
            }

            next_page = batch_end;
        }
    }

    /// Fan out one batch of page requests; results come back in page
    /// order. A 429 that survived the executor's own retries gets one
    /// more chance after a pause instead of failing the whole batch.
    fn fetch_batch(
        &self,
        endpoint: Endpoint,
        pages: &[u32],
        page_size: u32,
        extra_params: &[(String, String)],
    ) -> Vec<Result<Option<PageData>, SyncError>> {
        let fetch = |page: u32| {
            self.source.fetch_page(&PageCursor {
                endpoint,
                page,
                page_size,
                extra_params: extra_params.to_vec(),
            })
        };

        let mut results: Vec<_> = if pages.len() == 1 {
            vec![fetch(pages[0])]
        } else {
            pages.par_iter().map(|page| fetch(*page)).collect()
        };

        for (index, page) in pages.iter().enumerate() {
            if let Err(SyncError::Api { status: 429, .. }) = &results[index] {
                log::info!("page {} of {} was throttled, retrying once", page, endpoint.path);
                std::thread::sleep(RATE_LIMIT_PAUSE);
                results[index] = fetch(*page);
            }
        }
        results
    }

    fn pace(&self) {
        let delay = if self.tracker.should_throttle() {
            log::debug!("rate-limit budget low, throttling");
            THROTTLE_DELAY
        } else {
            INTER_REQUEST_DELAY
        };
        std::thread::sleep(delay);
    }
}
