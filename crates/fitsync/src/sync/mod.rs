//! Sync orchestration
//!
//! Pagination walks, batched entity fetches, change-log replay, and the
//! durable checkpoint machinery that lets an import span several
//! time-limited executions without losing or repeating work.

mod batch;
mod checkpoint;
mod delta;
mod import;
mod pagination;

pub use batch::{
    BATCH_SIZE, BatchFetchResult, BatchFetcher, FAILURE_THRESHOLD, MIN_SUCCESS_COUNT,
    RETRY_ATTEMPTS,
};
pub use checkpoint::{
    HEARTBEAT_INTERVAL, IMPORT_ACTIVE_STATE, IMPORT_PROGRESS_STATE, ImportCheckpoint,
    ImportSession, ResumeAction,
};
pub use delta::{DeltaSync, LAST_WORKOUT_UPDATE, sync_workout_events};
pub use import::{DEFAULT_PAGE_SIZE, ImportReport, ImportSinks, run_import};
pub use pagination::{DEFAULT_CONCURRENCY, MAX_PAGES, Paginator};
