use std::sync::Arc;

use pixelwarden_model::{JobKind, JobOutcome, JobState};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::{JobContext, JobTracker, ScanRequest, cleanup, scan, supervise};
use crate::classify::{Classifier, Reclassifier};
use crate::config::EngineConfig;
use crate::discovery::DiscoveryProvider;
use crate::error::{IntegrityError, Result};
use crate::maintenance::MaintenanceCoordinator;
use crate::probe::ProbeRouter;
use crate::store::{JobStateStore, ResultStore};

/// Entry point for starting, cancelling and observing jobs.
///
/// Holds one [`JobTracker`] per job kind, so at most one scan and one cleanup
/// run at a time.
#[derive(Debug, Clone)]
pub struct JobController {
    ctx: JobContext,
    scan: Arc<JobTracker>,
    cleanup: Arc<JobTracker>,
}

impl JobController {
    /// Builds the controller and recovers from an unclean shutdown: job
    /// records left running are closed out as interrupted and rows left in
    /// `scanning` go back to `pending`.
    pub async fn new(
        store: ResultStore,
        state_store: Arc<dyn JobStateStore>,
        discovery: Arc<dyn DiscoveryProvider>,
        router: Arc<ProbeRouter>,
        config: EngineConfig,
    ) -> Result<Self> {
        let scan = Arc::new(JobTracker::new(
            JobKind::Scan,
            Arc::clone(&state_store),
            config.eta_smoothing(),
        ));
        let cleanup = Arc::new(JobTracker::new(
            JobKind::Cleanup,
            state_store,
            config.eta_smoothing(),
        ));
        scan.recover().await?;
        cleanup.recover().await?;

        let released = store.release_stale_claims().await?;
        if released > 0 {
            warn!(released, "released claims left by a previous process");
        }

        let maintenance =
            MaintenanceCoordinator::new(store.pool().clone(), config.optimize_every_writes);
        let ctx = JobContext {
            store,
            maintenance,
            discovery,
            router,
            classifier: Arc::new(Classifier::builtin()),
            config,
        };
        Ok(Self { ctx, scan, cleanup })
    }

    /// Replaces the built-in rule table.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.ctx.classifier = Arc::new(classifier);
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.ctx.store
    }

    pub fn maintenance(&self) -> &MaintenanceCoordinator {
        &self.ctx.maintenance
    }

    pub fn tracker(&self, kind: JobKind) -> &Arc<JobTracker> {
        match kind {
            JobKind::Scan => &self.scan,
            JobKind::Cleanup => &self.cleanup,
        }
    }

    /// Starts a scan in the background.
    pub async fn start_scan(&self, request: ScanRequest) -> Result<JobHandle> {
        let tracker = Arc::clone(&self.scan);
        let run = tracker.start().await?;
        info!(
            job = %run.job_id,
            roots = request.roots.len(),
            files = request.files.len(),
            force = request.force_rescan,
            "scan requested"
        );

        let job = scan::run(self.ctx.clone(), Arc::clone(&tracker), request, run.cancel);
        let handle = tokio::spawn(supervise(tracker, self.ctx.store.clone(), job));
        Ok(JobHandle {
            kind: JobKind::Scan,
            job_id: run.job_id,
            handle,
        })
    }

    /// Starts a cleanup in the background.
    pub async fn start_cleanup(&self) -> Result<JobHandle> {
        let tracker = Arc::clone(&self.cleanup);
        let run = tracker.start().await?;
        info!(job = %run.job_id, "cleanup requested");

        let job = cleanup::run(self.ctx.clone(), Arc::clone(&tracker), run.cancel);
        let handle = tokio::spawn(supervise(tracker, self.ctx.store.clone(), job));
        Ok(JobHandle {
            kind: JobKind::Cleanup,
            job_id: run.job_id,
            handle,
        })
    }

    /// Asks the active run of `kind` to stop. Returns `false` when none is running.
    pub async fn request_cancel(&self, kind: JobKind) -> Result<bool> {
        self.tracker(kind).request_cancel().await
    }

    pub async fn snapshot(&self, kind: JobKind) -> JobState {
        self.tracker(kind).snapshot().await
    }

    /// Reclassifier sharing this controller's store and rule table.
    pub fn reclassifier(&self) -> Reclassifier {
        Reclassifier::new(self.ctx.store.clone(), Arc::clone(&self.ctx.classifier))
    }
}

/// A spawned job run.
#[derive(Debug)]
pub struct JobHandle {
    kind: JobKind,
    job_id: Uuid,
    handle: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to reach its terminal record.
    pub async fn wait(self) -> Result<JobOutcome> {
        self.handle
            .await
            .map_err(|e| IntegrityError::Internal(format!("{} job task failed: {e}", self.kind)))
    }
}
