//! Long-running scan and cleanup jobs.

mod cleanup;
mod controller;
mod scan;
mod tracker;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use pixelwarden_model::{JobKind, JobOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::discovery::DiscoveryProvider;
use crate::error::{IntegrityError, Result};
use crate::maintenance::MaintenanceCoordinator;
use crate::probe::ProbeRouter;
use crate::store::ResultStore;

pub use controller::{JobController, JobHandle};
pub use scan::ScanRequest;
pub use tracker::{JobRun, JobTracker, Progress};

/// Collaborators shared by every job run.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub store: ResultStore,
    pub maintenance: MaintenanceCoordinator,
    pub discovery: Arc<dyn DiscoveryProvider>,
    pub router: Arc<ProbeRouter>,
    pub classifier: Arc<Classifier>,
    pub config: EngineConfig,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("store", &self.store)
            .field("maintenance", &self.maintenance)
            .field("discovery", &std::any::type_name_of_val(self.discovery.as_ref()))
            .field("router", &self.router)
            .field("rules", &self.classifier.rules().len())
            .field("config", &self.config)
            .finish()
    }
}

/// Fails with [`IntegrityError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken, kind: JobKind) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(IntegrityError::Cancelled(kind));
    }
    Ok(())
}

/// Maps a run's result onto its terminal record.
pub(crate) async fn conclude(tracker: &JobTracker, result: Result<()>) -> JobOutcome {
    let (outcome, error_message) = match result {
        Ok(()) => (JobOutcome::Completed, None),
        Err(IntegrityError::Cancelled(_)) => {
            if let Err(err) = tracker.acknowledge_cancel().await {
                warn!(kind = %tracker.kind(), error = %err, "failed to record cancellation");
            }
            (JobOutcome::Cancelled, None)
        }
        Err(err) => {
            error!(
                kind = %tracker.kind(),
                error = %err,
                store_failure = err.is_store_failure(),
                "job failed"
            );
            (JobOutcome::Failed, Some(err.to_string()))
        }
    };

    if let Err(err) = tracker.finish(outcome, error_message).await {
        error!(kind = %tracker.kind(), error = %err, "failed to persist job outcome");
    }
    outcome
}

/// Awaits a run and closes it out as `failed` if it panics. A panicked scan
/// also hands its claimed rows back to `pending`.
pub(crate) async fn supervise<F>(tracker: Arc<JobTracker>, store: ResultStore, run: F) -> JobOutcome
where
    F: Future<Output = JobOutcome>,
{
    let reason = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(outcome) => return outcome,
        Err(payload) => panic_reason(&*payload),
    };
    error!(kind = %tracker.kind(), reason = %reason, "job panicked");

    if tracker.kind() == JobKind::Scan {
        match store.release_stale_claims().await {
            Ok(released) if released > 0 => {
                warn!(released, "released claims held by the panicked scan");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "failed to release claims after panic"),
        }
    }

    let message = format!("{} job panicked: {reason}", tracker.kind());
    if let Err(err) = tracker.finish(JobOutcome::Failed, Some(message)).await {
        error!(kind = %tracker.kind(), error = %err, "failed to persist job outcome");
    }
    JobOutcome::Failed
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
