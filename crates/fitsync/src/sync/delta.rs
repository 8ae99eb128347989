//! Delta sync: replay the server change log against the sink
//!
//! Instead of re-walking whole collections, incremental sync pulls the
//! event log since a durable cursor, classifies each entity's last event,
//! applies deletions, then fetches and upserts the bodies of created or
//! updated entities. The cursor only advances after everything applied,
//! so a crash mid-sync replays from the old cursor - safe, because both
//! operations are idempotent.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::api::{CollectionApi, Endpoint, RateLimitTracker, endpoints};
use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::models::{EntityId, Event, EventKind};
use crate::storage::{KvStore, RowSink};
use crate::sync::batch::BatchFetcher;
use crate::sync::pagination::Paginator;

/// Cursor key for the workout change log.
pub const LAST_WORKOUT_UPDATE: &str = "LAST_WORKOUT_UPDATE";

/// Page size used when pulling the event log.
const EVENT_PAGE_SIZE: u32 = 100;

pub struct DeltaSync<'a> {
    source: &'a dyn CollectionApi,
    tracker: RateLimitTracker,
    store: Arc<dyn KvStore>,
}

impl<'a> DeltaSync<'a> {
    pub fn new(
        source: &'a dyn CollectionApi,
        tracker: RateLimitTracker,
        store: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            source,
            tracker,
            store,
        }
    }

    /// Replay the change log at `events` since the cursor stored under
    /// `cursor_key`, resolving entity bodies from `entities`. Returns the
    /// number of changes applied to the sink.
    pub fn sync_since(
        &self,
        events: Endpoint,
        entities: Endpoint,
        cursor_key: &str,
        sink: &dyn RowSink,
        cancel: &CancelToken,
    ) -> Result<usize, SyncError> {
        let since = self.cursor(cursor_key)?;
        // Captured before the pull: events arriving while we sync will be
        // replayed next time rather than lost.
        let started_at = Utc::now();

        let mut entries: Vec<Event> = Vec::new();
        let mut unrecognized = 0usize;
        let paginator = Paginator::new(self.source, self.tracker.clone());
        paginator.walk(
            events,
            EVENT_PAGE_SIZE,
            vec![("since".to_string(), since.to_rfc3339())],
            cancel,
            |items| {
                for item in items {
                    match serde_json::from_value::<Event>(item) {
                        Ok(event) => entries.push(event),
                        Err(_) => unrecognized += 1,
                    }
                }
                Ok(())
            },
        )?;
        if unrecognized > 0 {
            log::warn!("{} unrecognized event records skipped", unrecognized);
        }

        if entries.is_empty() {
            log::debug!("no changes since {}", since.to_rfc3339());
            self.store.set(cursor_key, &started_at.to_rfc3339())?;
            return Ok(0);
        }

        // Last event wins per entity within the window.
        let mut last_kind: HashMap<EntityId, EventKind> = HashMap::new();
        let mut order: Vec<EntityId> = Vec::new();
        for event in &entries {
            if !last_kind.contains_key(&event.entity_id) {
                order.push(event.entity_id.clone());
            }
            last_kind.insert(event.entity_id.clone(), event.kind);
        }
        let deletions: HashSet<EntityId> = order
            .iter()
            .filter(|id| last_kind[*id] == EventKind::Deleted)
            .cloned()
            .collect();
        let upserts: Vec<EntityId> = order
            .iter()
            .filter(|id| last_kind[*id] != EventKind::Deleted)
            .cloned()
            .collect();

        // Deletions first: an entity deleted and recreated inside the
        // window must come back as an upsert, not vanish.
        if !deletions.is_empty() {
            sink.delete_by_ids(&deletions)?;
        }

        let mut applied = deletions.len();
        if !upserts.is_empty() {
            let fetched =
                BatchFetcher::new(self.source).fetch_all(entities, &upserts, cancel)?;
            applied += fetched.succeeded.len();
            sink.upsert(fetched.succeeded)?;
        }

        self.store.set(cursor_key, &started_at.to_rfc3339())?;
        log::info!(
            "delta sync applied {} changes ({} deletions) since {}",
            applied,
            deletions.len(),
            since.to_rfc3339()
        );
        Ok(applied)
    }

    fn cursor(&self, key: &str) -> Result<DateTime<Utc>, SyncError> {
        match self.store.get(key)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    SyncError::validation(format!("stored cursor {key} is not a timestamp: {e}"))
                }),
            None => Ok(DateTime::UNIX_EPOCH),
        }
    }
}

/// Incremental sync entry point for the workout change log.
pub fn sync_workout_events(
    source: &dyn CollectionApi,
    tracker: RateLimitTracker,
    store: Arc<dyn KvStore>,
    sink: &dyn RowSink,
    cancel: &CancelToken,
) -> Result<usize, SyncError> {
    DeltaSync::new(source, tracker, store).sync_since(
        endpoints::WORKOUT_EVENTS,
        endpoints::WORKOUTS,
        LAST_WORKOUT_UPDATE,
        sink,
        cancel,
    )
}
