//! fitsync - resilient synchronization core for a workout-tracking API
//!
//! This crate is the engine a spreadsheet add-on uses to mirror a
//! rate-limited, paginated REST service into tabular rows:
//! - A guarded request executor (retry, weighted circuit breaker,
//!   adaptive rate limiting)
//! - Pagination and change-log replay with bounded fan-out
//! - Batched entity fetching with partial-failure thresholds
//! - Durable, resumable import checkpoints that survive the host's
//!   forced suspension mid-run
//!
//! The tabular sink, credential UI and presentation surfaces live in the
//! host application; this crate only sees rows, ids and a key-value
//! store.

pub mod api;
pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod sync;

pub use api::{
    ApiClient, ApiResponse, CircuitBreaker, CircuitState, CollectionApi, DEFAULT_BASE_URL,
    Endpoint, PageCursor, PageData, RateLimitBudget, RateLimitTracker, RequestDescriptor,
    RequestExecutor, RetryPolicy, endpoints,
};
pub use cancel::CancelToken;
pub use config::ApiCredentials;
pub use error::{SyncError, SyncResult};
pub use models::{ActiveState, EntityId, Event, EventKind, ImportProgress};
pub use storage::{
    AdvisoryLock, FileKvStore, InMemoryKvStore, InMemoryRowSink, InProcessLock, KvStore,
    LockAcquire, Row, RowSink, UnavailableLock,
};
pub use sync::{
    BatchFetchResult, BatchFetcher, DeltaSync, ImportCheckpoint, ImportReport, ImportSession,
    ImportSinks, Paginator, ResumeAction, run_import, sync_workout_events,
};
