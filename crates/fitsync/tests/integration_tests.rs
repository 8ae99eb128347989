//! Integration tests for the fitsync crate
//!
//! These tests drive the complete flow - full import, suspension and
//! resume across separate executions, and change-log replay - against a
//! scripted service and real storage implementations.

use fitsync::{
    CancelToken, CollectionApi, Endpoint, EntityId, FileKvStore, ImportSinks, InMemoryKvStore,
    InMemoryRowSink, InProcessLock, KvStore, PageCursor, PageData, RateLimitTracker, ResumeAction,
    Row, RowSink, SyncError, run_import, sync_workout_events,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scripted service: collections are served in proper pages, requests
/// past the last page answer "not found", and entity lookups resolve
/// from the same data.
struct FakeService {
    collections: HashMap<&'static str, Vec<Row>>,
    fetches: AtomicUsize,
    /// Cancel the token once this many page fetches have been served.
    cancel_after: Mutex<Option<(usize, CancelToken)>>,
}

impl FakeService {
    fn new() -> Self {
        let mut collections = HashMap::new();
        collections.insert("exercise_templates", rows("ex", 7));
        collections.insert("routine_folders", rows("folder", 2));
        collections.insert("routines", rows("routine", 4));
        collections.insert("workouts", rows("workout", 12));
        Self {
            collections,
            fetches: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    fn with_events(mut self, events: Vec<Row>) -> Self {
        self.collections.insert("workouts/events", events);
        self
    }

    fn cancel_after(self, fetches: usize, token: CancelToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((fetches, token));
        self
    }
}

fn rows(prefix: &str, count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| json!({"id": format!("{prefix}{i}"), "title": format!("{prefix} {i}")}))
        .collect()
}

impl CollectionApi for FakeService {
    fn fetch_page(&self, cursor: &PageCursor) -> Result<Option<PageData>, SyncError> {
        let served = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let mut trigger = self.cancel_after.lock().unwrap();
        if let Some((threshold, token)) = trigger.as_ref() {
            if served >= *threshold {
                token.cancel();
                trigger.take();
            }
        }
        drop(trigger);

        let Some(items) = self.collections.get(cursor.endpoint.path) else {
            return Ok(None);
        };
        let start = (cursor.page as usize - 1) * cursor.page_size as usize;
        if start >= items.len() {
            return if cursor.page == 1 {
                Ok(Some(PageData {
                    items: Vec::new(),
                    page_count: Some(0),
                }))
            } else {
                Ok(None)
            };
        }
        let end = (start + cursor.page_size as usize).min(items.len());
        Ok(Some(PageData {
            items: items[start..end].to_vec(),
            page_count: None,
        }))
    }

    fn get_entity(&self, endpoint: Endpoint, id: &EntityId) -> Result<Row, SyncError> {
        self.collections
            .get(endpoint.path)
            .and_then(|items| {
                items
                    .iter()
                    .find(|row| row["id"].as_str() == Some(id.as_str()))
            })
            .cloned()
            .ok_or(SyncError::Api {
                status: 404,
                body: String::new(),
            })
    }
}

struct Sinks {
    exercises: InMemoryRowSink,
    routine_folders: InMemoryRowSink,
    routines: InMemoryRowSink,
    workouts: InMemoryRowSink,
}

impl Sinks {
    fn new() -> Self {
        Self {
            exercises: InMemoryRowSink::new(),
            routine_folders: InMemoryRowSink::new(),
            routines: InMemoryRowSink::new(),
            workouts: InMemoryRowSink::new(),
        }
    }

    fn as_import_sinks(&self) -> ImportSinks<'_> {
        ImportSinks {
            exercises: &self.exercises,
            routine_folders: &self.routine_folders,
            routines: &self.routines,
            workouts: &self.workouts,
        }
    }
}

fn tracker() -> RateLimitTracker {
    RateLimitTracker::new(Arc::new(InMemoryKvStore::new()))
}

#[test]
fn test_full_import_lands_every_collection() {
    let service = FakeService::new();
    let sinks = Sinks::new();

    let report = run_import(
        &service,
        tracker(),
        Arc::new(InMemoryKvStore::new()),
        Arc::new(InProcessLock::new()),
        &sinks.as_import_sinks(),
        ResumeAction::Resume,
        &CancelToken::never(),
    )
    .unwrap();

    assert!(!report.suspended);
    assert_eq!(report.items_imported, 25);
    assert_eq!(sinks.exercises.len(), 7);
    assert_eq!(sinks.routine_folders.len(), 2);
    assert_eq!(sinks.routines.len(), 4);
    assert_eq!(sinks.workouts.len(), 12);
}

#[test]
fn test_import_is_idempotent() {
    let sinks = Sinks::new();
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let lock = Arc::new(InProcessLock::new());

    for _ in 0..2 {
        let service = FakeService::new();
        run_import(
            &service,
            tracker(),
            store.clone(),
            lock.clone(),
            &sinks.as_import_sinks(),
            ResumeAction::Resume,
            &CancelToken::never(),
        )
        .unwrap();
    }

    assert_eq!(sinks.workouts.len(), 12);
    assert_eq!(sinks.exercises.len(), 7);
}

#[test]
fn test_suspended_import_resumes_across_executions() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("sync-state.json");
    let sinks = Sinks::new();

    // First execution: budget runs out early in the run.
    let cancel = CancelToken::never();
    let service = FakeService::new().cancel_after(1, cancel.clone());
    let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(&state_path).unwrap());
    let report = run_import(
        &service,
        tracker(),
        store,
        Arc::new(InProcessLock::new()),
        &sinks.as_import_sinks(),
        ResumeAction::Resume,
        &cancel,
    )
    .unwrap();

    assert!(report.suspended);
    let finished_first = report.steps_run.clone();
    assert!(finished_first.len() < 4);

    // Second execution, separate process simulated by reopening the
    // state file: completed steps are skipped, the rest run.
    let service = FakeService::new();
    let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(&state_path).unwrap());
    let report = run_import(
        &service,
        tracker(),
        store.clone(),
        Arc::new(InProcessLock::new()),
        &sinks.as_import_sinks(),
        ResumeAction::Resume,
        &CancelToken::never(),
    )
    .unwrap();

    assert!(!report.suspended);
    for step in &finished_first {
        assert!(
            report.steps_skipped.contains(step),
            "{step} was redone on resume"
        );
    }
    assert_eq!(sinks.workouts.len(), 12);
    assert_eq!(sinks.exercises.len(), 7);

    // Full success cleared the checkpoint.
    assert!(store.get("IMPORT_PROGRESS_STATE").unwrap().is_none());
}

#[test]
fn test_change_log_replay_updates_the_mirror() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let sink = InMemoryRowSink::new();
    sink.upsert(rows("workout", 12)).unwrap();

    let service = FakeService::new().with_events(vec![
        json!({"type": "updated", "id": "workout3"}),
        json!({"type": "deleted", "id": "workout5"}),
        json!({"type": "created", "id": "workout11"}),
    ]);

    let applied =
        sync_workout_events(&service, tracker(), store.clone(), &sink, &CancelToken::never())
            .unwrap();

    assert_eq!(applied, 3);
    assert!(!sink.contains("workout5"));
    assert!(sink.contains("workout3"));
    assert_eq!(sink.len(), 11);
    assert!(store.get("LAST_WORKOUT_UPDATE").unwrap().is_some());
}

#[test]
fn test_change_log_replay_is_idempotent() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let sink = InMemoryRowSink::new();

    let events = vec![
        json!({"type": "created", "id": "workout1"}),
        json!({"type": "created", "id": "workout2"}),
    ];

    for _ in 0..2 {
        let service = FakeService::new().with_events(events.clone());
        sync_workout_events(&service, tracker(), store.clone(), &sink, &CancelToken::never())
            .unwrap();
    }

    assert_eq!(sink.len(), 2);
}

#[test]
fn test_empty_change_log_leaves_sink_alone() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let sink = InMemoryRowSink::new();
    sink.upsert(rows("workout", 3)).unwrap();

    let service = FakeService::new().with_events(Vec::new());
    let applied =
        sync_workout_events(&service, tracker(), store, &sink, &CancelToken::never()).unwrap();

    assert_eq!(applied, 0);
    assert_eq!(sink.len(), 3);
}

#[test]
fn test_second_import_waits_its_turn() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
    let lock = Arc::new(InProcessLock::new());

    let checkpoint = fitsync::ImportCheckpoint::new(store.clone(), lock.clone());
    let _held = checkpoint.begin().unwrap();

    let service = FakeService::new();
    let sinks = Sinks::new();
    let error = run_import(
        &service,
        tracker(),
        store,
        lock,
        &sinks.as_import_sinks(),
        ResumeAction::Resume,
        &CancelToken::never(),
    )
    .unwrap_err();

    assert!(matches!(error, SyncError::AlreadyActive));
}
