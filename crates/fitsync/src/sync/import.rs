//! Full-import driver
//!
//! Sequences the named import steps through a checkpoint session, one
//! paginated walk per entity type. Workouts run last: their rows lean on
//! the exercise name table the first step fills in. A timeout suspends
//! the run (progress kept, resumable); anything else fails it.

use std::sync::Arc;
use std::time::Instant;

use crate::api::{CollectionApi, Endpoint, RateLimitTracker, endpoints};
use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::storage::{AdvisoryLock, KvStore, RowSink};
use crate::sync::checkpoint::{ImportCheckpoint, ImportSession, ResumeAction};
use crate::sync::pagination::Paginator;

/// Page size for bulk collection walks.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Sinks for each entity type a full import writes.
pub struct ImportSinks<'a> {
    pub exercises: &'a dyn RowSink,
    pub routine_folders: &'a dyn RowSink,
    pub routines: &'a dyn RowSink,
    pub workouts: &'a dyn RowSink,
}

/// Statistics from one import execution.
#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    /// Steps executed in this run.
    pub steps_run: Vec<String>,
    /// Steps skipped (already complete, or budget exhausted).
    pub steps_skipped: Vec<String>,
    /// Items handed to the sinks, including a suspended step's partial count.
    pub items_imported: u64,
    /// True when the run stopped on the execution budget; progress is
    /// kept and a later run resumes where this one left off.
    pub suspended: bool,
    pub duration_ms: u64,
}

/// Run (or resume) a full import.
///
/// `resume` is the caller's decision about progress left by an earlier
/// suspended run: resume past it, restart from scratch, or cancel.
pub fn run_import(
    source: &dyn CollectionApi,
    tracker: RateLimitTracker,
    store: Arc<dyn KvStore>,
    lock: Arc<dyn AdvisoryLock>,
    sinks: &ImportSinks<'_>,
    resume: ResumeAction,
    cancel: &CancelToken,
) -> Result<ImportReport, SyncError> {
    let start = Instant::now();
    let mut report = ImportReport::default();

    let checkpoint = ImportCheckpoint::new(store, lock);
    match resume {
        ResumeAction::Cancel => return Ok(report),
        ResumeAction::Restart => checkpoint.clear_progress()?,
        ResumeAction::Resume => {}
    }

    let session = checkpoint.begin()?;
    let outcome = run_steps(&session, source, &tracker, sinks, cancel, &mut report);
    match outcome {
        Ok(()) => {
            report.suspended = cancel.is_cancelled();
            session.end(!report.suspended)?;
        }
        Err(SyncError::Timeout { processed }) => {
            log::info!(
                "import suspended by execution budget after {} items",
                processed
            );
            report.items_imported += processed;
            report.suspended = true;
            session.end(false)?;
        }
        Err(error) => {
            session.end(false)?;
            return Err(error);
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

fn run_steps(
    session: &ImportSession<'_>,
    source: &dyn CollectionApi,
    tracker: &RateLimitTracker,
    sinks: &ImportSinks<'_>,
    cancel: &CancelToken,
    report: &mut ImportReport,
) -> Result<(), SyncError> {
    let steps: [(&str, &dyn RowSink, Endpoint); 4] = [
        ("exercises", sinks.exercises, endpoints::EXERCISES),
        (
            "routine_folders",
            sinks.routine_folders,
            endpoints::ROUTINE_FOLDERS,
        ),
        ("routines", sinks.routines, endpoints::ROUTINES),
        // Last on purpose: workout rows reference the exercise table.
        ("workouts", sinks.workouts, endpoints::WORKOUTS),
    ];

    for (name, sink, endpoint) in steps {
        session.heartbeat()?;
        let ran = session.run_step(name, cancel, || {
            let paginator = Paginator::new(source, tracker.clone());
            paginator.walk(endpoint, DEFAULT_PAGE_SIZE, Vec::new(), cancel, |rows| {
                sink.upsert(rows)
            })
        })?;
        match ran {
            Some(count) => {
                report.steps_run.push(name.to_string());
                report.items_imported += count;
            }
            None => report.steps_skipped.push(name.to_string()),
        }
    }
    Ok(())
}
