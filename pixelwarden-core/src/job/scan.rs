use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use pixelwarden_model::{JobKind, JobOutcome, JobPhase};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::drop_stale;
use super::{JobContext, JobTracker, Progress, conclude, ensure_not_cancelled};
use crate::discovery::DiscoveredFile;
use crate::error::{IntegrityError, Result};
use crate::pool::{BatchReport, WorkerPool};
use crate::store::UpsertSummary;

const KIND: JobKind = JobKind::Scan;
const DISCOVERY_CHUNK: usize = 500;

/// Parameters of one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Directories to walk. Each is scanned recursively.
    pub roots: Vec<PathBuf>,
    /// Specific files to scan. When set, `roots` are not walked and only
    /// these files are probed.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Re-probe every discovered file, not just new and changed ones.
    #[serde(default)]
    pub force_rescan: bool,
}

impl ScanRequest {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Scan exactly these files.
    pub fn files(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: files.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_targeted(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn force_rescan(mut self, force: bool) -> Self {
        self.force_rescan = force;
        self
    }
}

/// Drives a started scan to its terminal record.
pub(crate) async fn run(
    ctx: JobContext,
    tracker: Arc<JobTracker>,
    request: ScanRequest,
    cancel: CancellationToken,
) -> JobOutcome {
    let result = execute(&ctx, &tracker, &request, &cancel).await;
    conclude(&tracker, result).await
}

async fn execute(
    ctx: &JobContext,
    tracker: &Arc<JobTracker>,
    request: &ScanRequest,
    cancel: &CancellationToken,
) -> Result<()> {
    // Phase 1: discovery
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Discovering, 1, 0, 0).message("Discovering media files"),
            )
            .await,
    )?;
    let mut files = if request.is_targeted() {
        resolve_targets(ctx, &request.files, cancel).await?
    } else {
        ctx.discovery.discover(&request.roots, cancel).await?
    };
    ensure_not_cancelled(cancel, KIND)?;
    files.retain(|file| !ctx.config.is_excluded(&file.path));
    let targets: Option<HashSet<String>> = request
        .is_targeted()
        .then(|| files.iter().map(DiscoveredFile::path_string).collect());

    let discovered = files.len() as i64;
    tracker.set_estimates(discovered, discovered).await;
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Discovering, 1, 0, discovered)
                    .message(format!("Recording {discovered} discovered files")),
            )
            .await,
    )?;

    let recorded = record_discovered(ctx, tracker, files, request.force_rescan, cancel).await?;
    info!(
        discovered,
        inserted = recorded.inserted,
        reset = recorded.reset,
        in_flight = recorded.in_flight,
        "discovery recorded"
    );
    ensure_not_cancelled(cancel, KIND)?;

    // Phase 2: probing
    let mut pending = ctx.store.pending_paths(None).await?;
    if let Some(targets) = &targets {
        pending.retain(|path| targets.contains(path));
    }
    let total = pending.len() as i64;
    tracker.set_estimates(discovered, total).await;
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Scanning, 2, 0, total)
                    .message(format!("Scanning {total} files")),
            )
            .await,
    )?;

    let ignored = ctx.store.active_ignored_patterns().await?;
    let classifier = Arc::new(ctx.classifier.with_ignored_patterns(&ignored));
    let pool = WorkerPool::new(ctx.store.clone(), ctx.router.clone(), classifier, &ctx.config);

    let mut totals = BatchReport::default();
    for batch in pending.chunks(ctx.config.batch_size()) {
        ensure_not_cancelled(cancel, KIND)?;
        let report = pool.run_batch(batch, cancel, tracker).await?;
        totals.merge(&report);
        ctx.maintenance.note_writes(report.writes()).await?;
        tracker
            .checkpoint(Some(format!("Scanned {} of {total} files", totals.attempted())))
            .await?;
        if report.not_started > 0 {
            return Err(IntegrityError::Cancelled(KIND));
        }
    }
    ensure_not_cancelled(cancel, KIND)?;

    // Phase 3: finalize
    drop_stale(
        tracker
            .advance(
                Progress::new(JobPhase::Finalizing, 3, 0, 1).message("Refreshing statistics"),
            )
            .await,
    )?;
    ctx.maintenance.refresh_statistics().await?;

    let summary = format!(
        "Scan complete: {} healthy, {} warnings, {} corrupted, {} errors",
        totals.healthy, totals.warning, totals.corrupted, totals.errored
    );
    info!(
        healthy = totals.healthy,
        warning = totals.warning,
        corrupted = totals.corrupted,
        errored = totals.errored,
        conflicts = totals.conflicts,
        stale = totals.stale,
        "scan finished"
    );
    drop_stale(
        tracker
            .advance(Progress::new(JobPhase::Finalizing, 3, 1, 1).message(summary))
            .await,
    )
}

/// Looks up the requested files. Unsupported, excluded, missing and
/// unreadable paths are logged and left out.
async fn resolve_targets(
    ctx: &JobContext,
    paths: &[PathBuf],
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredFile>> {
    let mut found = Vec::with_capacity(paths.len());
    for path in paths {
        ensure_not_cancelled(cancel, KIND)?;
        let Some(family) = ctx.config.scannable_family(path) else {
            debug!(path = %path.display(), "not a scannable media file");
            continue;
        };
        match ctx.discovery.identity(path).await {
            Ok(Some(identity)) => {
                let ext = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default();
                found.push(
                    DiscoveredFile::new(path, identity).with_file_type(family.file_type(ext)),
                );
            }
            Ok(None) => warn!(path = %path.display(), "requested file not found"),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable file"),
        }
    }
    if found.is_empty() {
        warn!(requested = paths.len(), "none of the requested files can be scanned");
    }
    Ok(found)
}

/// Upserts the discovered files inside one relaxed-durability window,
/// reporting progress per chunk.
async fn record_discovered(
    ctx: &JobContext,
    tracker: &Arc<JobTracker>,
    files: Vec<DiscoveredFile>,
    force_rescan: bool,
    cancel: &CancellationToken,
) -> Result<UpsertSummary> {
    if files.is_empty() {
        return Ok(UpsertSummary::default());
    }

    let store = ctx.store.clone();
    let tracker = Arc::clone(tracker);
    let cancel = cancel.clone();
    let total = files.len() as i64;

    ctx.maintenance
        .bulk_write(move |conn| {
            Box::pin(async move {
                let mut summary = UpsertSummary::default();
                let mut recorded = 0_i64;
                for chunk in files.chunks(DISCOVERY_CHUNK) {
                    ensure_not_cancelled(&cancel, KIND)?;
                    summary.merge(store.upsert_discovered(&mut *conn, chunk, force_rescan).await?);
                    recorded += chunk.len() as i64;
                    drop_stale(
                        tracker
                            .advance(Progress::new(JobPhase::Discovering, 1, recorded, total))
                            .await,
                    )?;
                }
                Ok(summary)
            })
        })
        .await
}
