use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use pixelwarden_model::{JobKind, JobOutcome, JobPhase, ScanStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::drop_stale;
use super::{JobContext, JobTracker, Progress, conclude, ensure_not_cancelled};
use crate::error::Result;
use crate::store::StoredIdentity;

const KIND: JobKind = JobKind::Cleanup;

/// What reconciliation found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CleanupReport {
    checked: usize,
    orphaned: Vec<String>,
    changed: Vec<String>,
    unreadable: usize,
    deleted: u64,
    reset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileCheck {
    Present,
    Missing,
    Changed,
    /// Identity could not be read; the row is left as it is.
    Unreadable,
}

/// Drives a started cleanup to its terminal record.
pub(crate) async fn run(
    ctx: JobContext,
    tracker: Arc<JobTracker>,
    cancel: CancellationToken,
) -> JobOutcome {
    let result = execute(&ctx, &tracker, &cancel).await.map(|report| {
        info!(
            checked = report.checked,
            orphaned = report.orphaned.len(),
            changed = report.changed.len(),
            unreadable = report.unreadable,
            deleted = report.deleted,
            reset = report.reset,
            "cleanup finished"
        );
    });
    conclude(&tracker, result).await
}

async fn execute(
    ctx: &JobContext,
    tracker: &JobTracker,
    cancel: &CancellationToken,
) -> Result<CleanupReport> {
    // Phase 1: load what the table knows about
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Discovering, 1, 0, 0).message("Loading stored results"),
            )
            .await,
    )?;
    let rows = ctx.store.stored_identities().await?;
    let total = rows.len() as i64;
    tracker.set_estimates(total, total).await;
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Discovering, 1, total, total)
                    .message(format!("Loaded {total} stored results")),
            )
            .await,
    )?;
    ensure_not_cancelled(cancel, KIND)?;

    // Phase 2: compare against the filesystem
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::CheckingFiles, 2, 0, total)
                    .message(format!("Checking {total} files")),
            )
            .await,
    )?;

    let mut report = CleanupReport::default();
    for batch in rows.chunks(ctx.config.batch_size()) {
        ensure_not_cancelled(cancel, KIND)?;
        let checks: Vec<(StoredIdentity, FileCheck)> = stream::iter(batch.to_vec())
            .map(|row| async move { check_row(ctx, tracker, row).await })
            .buffer_unordered(ctx.config.worker_count())
            .collect()
            .await;

        for (row, check) in checks {
            report.checked += 1;
            match check {
                FileCheck::Present => {}
                FileCheck::Missing => report.orphaned.push(row.file_path),
                FileCheck::Changed => report.changed.push(row.file_path),
                FileCheck::Unreadable => report.unreadable += 1,
            }
        }
        tracker
            .checkpoint(Some(format!(
                "Checked {} of {total} files, {} missing, {} changed",
                report.checked,
                report.orphaned.len(),
                report.changed.len()
            )))
            .await?;
    }
    ensure_not_cancelled(cancel, KIND)?;

    // Phase 3: reconcile the table
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Reconciling, 3, 0, 2)
                    .message(format!("Removing {} orphaned results", report.orphaned.len())),
            )
            .await,
    )?;
    report.deleted = ctx.store.delete_paths(&report.orphaned).await?;

    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Reconciling, 3, 1, 2).message(format!(
                    "Queueing {} changed files for rescan",
                    report.changed.len()
                )),
            )
            .await,
    )?;
    report.reset = ctx.store.reset_paths_for_rescan(&report.changed).await?;
    ctx.maintenance.note_writes(report.deleted + report.reset).await?;

    drop_stale(
        tracker
            .advance(Progress::new(JobPhase::Reconciling, 3, 2, 2).message(format!(
                "Cleanup complete: {} orphaned results removed, {} changed files queued for rescan",
                report.deleted, report.reset
            )))
            .await,
    )?;
    Ok(report)
}

/// Compares one stored row against the file on disk. A file whose identity
/// cannot be read is logged and left alone.
async fn check_row(
    ctx: &JobContext,
    tracker: &JobTracker,
    row: StoredIdentity,
) -> (StoredIdentity, FileCheck) {
    let started = Instant::now();
    let current = ctx.discovery.identity(Path::new(&row.file_path)).await;
    tracker.record_file(&row.file_path, started.elapsed()).await;

    let check = match current {
        Err(err) => {
            warn!(path = %row.file_path, error = %err, "could not check file; leaving its result");
            FileCheck::Unreadable
        }
        Ok(None) => FileCheck::Missing,
        // Pending rows are probed by the next scan anyway; scanning rows belong to a worker.
        Ok(Some(_)) if matches!(row.scan_status, ScanStatus::Pending | ScanStatus::Scanning) => {
            FileCheck::Present
        }
        Ok(Some(current)) if row.identity().differs_from(&current) => FileCheck::Changed,
        Ok(Some(_)) => FileCheck::Present,
    };
    if matches!(check, FileCheck::Missing | FileCheck::Changed) {
        debug!(path = %row.file_path, check = ?check, "stored result out of date");
    }
    (row, check)
}
