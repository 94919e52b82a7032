use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pixelwarden_model::{JobKind, JobOutcome, JobPhase, JobState};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IntegrityError, Result};
use crate::store::JobStateStore;

/// A progress report for the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: JobPhase,
    pub phase_number: i64,
    pub current: i64,
    pub total: i64,
    pub message: Option<String>,
}

impl Progress {
    pub fn new(phase: JobPhase, phase_number: i64, current: i64, total: i64) -> Self {
        Self {
            phase,
            phase_number,
            current,
            total,
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Identity and cancellation signal of a freshly started run.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub job_id: Uuid,
    pub cancel: CancellationToken,
}

struct Inner {
    state: JobState,
    cancel: CancellationToken,
}

/// Single writer of the [`JobState`] for one job kind.
///
/// Every mutation happens under one short async lock. Progress from
/// [`JobTracker::record_file`] stays in memory until the next checkpoint;
/// everything else is persisted immediately.
pub struct JobTracker {
    kind: JobKind,
    inner: Mutex<Inner>,
    store: Arc<dyn JobStateStore>,
    eta_smoothing: f64,
}

impl fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self
            .inner
            .try_lock()
            .map(|inner| inner.state.is_running)
            .ok();
        f.debug_struct("JobTracker")
            .field("kind", &self.kind)
            .field("running", &running)
            .field("eta_smoothing", &self.eta_smoothing)
            .finish()
    }
}

impl JobTracker {
    pub fn new(kind: JobKind, store: Arc<dyn JobStateStore>, eta_smoothing: f64) -> Self {
        Self {
            kind,
            inner: Mutex::new(Inner {
                state: JobState::idle(kind),
                cancel: CancellationToken::new(),
            }),
            store,
            eta_smoothing: eta_smoothing.clamp(0.01, 1.0),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Loads the persisted record. A record still flagged running belongs to
    /// a process that died mid-job and is closed out as `interrupted`.
    pub async fn recover(&self) -> Result<JobState> {
        let mut inner = self.inner.lock().await;
        let Some(mut state) = self.store.load(self.kind).await? else {
            inner.state = JobState::idle(self.kind);
            return Ok(inner.state.clone());
        };

        if state.is_running {
            warn!(
                kind = %self.kind,
                job = ?state.job_id,
                phase = %state.phase,
                "closing out interrupted job"
            );
            state.is_running = false;
            state.phase = JobPhase::Interrupted;
            state.outcome = Some(JobOutcome::Interrupted);
            state.end_time = Some(Utc::now());
            state.current_file = None;
            state.error_message = Some("process stopped while the job was running".to_string());
            self.store.save(&state).await?;
        }
        inner.state = state;
        Ok(inner.state.clone())
    }

    /// Resets the record for a new run and enters `discovering`.
    ///
    /// Fails with [`IntegrityError::AlreadyRunning`] and leaves the record
    /// untouched when a run of this kind is active.
    pub async fn start(&self) -> Result<JobRun> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_running {
            return Err(IntegrityError::AlreadyRunning(self.kind));
        }

        let job_id = Uuid::now_v7();
        let mut next = JobState::idle(self.kind);
        next.job_id = Some(job_id);
        next.is_running = true;
        next.phase = JobPhase::Discovering;
        next.phase_number = 1;
        next.start_time = Some(Utc::now());
        next.progress_message = Some(format!("Starting {} job", self.kind));

        self.store.save(&next).await?;

        let cancel = CancellationToken::new();
        inner.state = next;
        inner.cancel = cancel.clone();
        info!(kind = %self.kind, job = %job_id, "job started");
        Ok(JobRun { job_id, cancel })
    }

    /// Flags the active run for cancellation. Returns `false` when nothing
    /// is running. Repeated calls are harmless.
    pub async fn request_cancel(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running {
            return Ok(false);
        }
        inner.cancel.cancel();
        if inner.state.cancel_requested {
            return Ok(true);
        }

        inner.state.cancel_requested = true;
        inner.state.progress_message = Some("Cancellation requested".to_string());
        self.store.save(&inner.state).await?;
        info!(kind = %self.kind, job = ?inner.state.job_id, "cancellation requested");
        Ok(true)
    }

    pub async fn cancel_token(&self) -> CancellationToken {
        self.inner.lock().await.cancel.clone()
    }

    /// Monotonic progress update, persisted immediately.
    pub async fn advance(&self, progress: Progress) -> Result<JobState> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if !state.is_running {
            return Err(IntegrityError::NotRunning(self.kind));
        }

        let stale = progress.phase_number < state.phase_number
            || (progress.phase_number == state.phase_number
                && progress.phase == state.phase
                && progress.current < state.phase_current);
        if stale {
            debug!(
                kind = %self.kind,
                current = state.phase_number,
                attempted = progress.phase_number,
                "dropping stale progress update"
            );
            return Err(IntegrityError::StaleUpdate {
                kind: self.kind,
                current: state.phase_number,
                attempted: progress.phase_number,
            });
        }
        if progress.phase != state.phase && !state.phase.can_transition_to(progress.phase) {
            return Err(IntegrityError::InvalidTransition {
                from: state.phase,
                to: progress.phase,
            });
        }

        let total = progress.total.max(0);
        state.phase = progress.phase;
        state.phase_number = progress.phase_number.clamp(1, state.total_phases);
        state.phase_total = total;
        state.phase_current = progress.current.clamp(0, total);
        if let Some(message) = progress.message {
            state.progress_message = Some(message);
        }

        self.store.save(state).await?;
        Ok(state.clone())
    }

    /// Sets the discovery count and the number of files the run expects to
    /// process. Persisted with the next checkpoint.
    pub async fn set_estimates(&self, discovery_count: i64, estimated_total: i64) {
        let mut inner = self.inner.lock().await;
        inner.state.discovery_count = discovery_count.max(0);
        inner.state.estimated_total = estimated_total.max(inner.state.files_processed);
    }

    /// Counts one processed file and folds its duration into the moving
    /// average. In memory only.
    pub async fn record_file(&self, path: &str, elapsed: Duration) {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if !state.is_running {
            return;
        }

        let sample = elapsed.as_secs_f64();
        state.average_scan_time = Some(match state.average_scan_time {
            Some(previous) => self.eta_smoothing * sample + (1.0 - self.eta_smoothing) * previous,
            None => sample,
        });
        state.files_processed += 1;
        state.estimated_total = state.estimated_total.max(state.files_processed);
        state.phase_current = (state.phase_current + 1).min(state.phase_total);
        state.current_file = Some(path.to_string());
    }

    /// Persists the in-memory record.
    pub async fn checkpoint(&self, message: Option<String>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running {
            return Err(IntegrityError::NotRunning(self.kind));
        }
        if let Some(message) = message {
            inner.state.progress_message = Some(message);
        }
        self.store.save(&inner.state).await
    }

    /// Records that the run observed its cancellation and is winding down.
    pub async fn acknowledge_cancel(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_running {
            return Err(IntegrityError::NotRunning(self.kind));
        }
        inner.state.phase = JobPhase::Cancelling;
        inner.state.progress_message = Some("Cancelling".to_string());
        self.store.save(&inner.state).await
    }

    /// Ends the run. The in-memory record is released even when persisting
    /// it fails, so a later start is not blocked by a store outage.
    pub async fn finish(&self, outcome: JobOutcome, error: Option<String>) -> Result<JobState> {
        let mut inner = self.inner.lock().await;
        let state = &mut inner.state;
        if !state.is_running {
            return Err(IntegrityError::NotRunning(self.kind));
        }

        state.is_running = false;
        state.phase = outcome.terminal_phase();
        state.outcome = Some(outcome);
        state.end_time = Some(Utc::now());
        state.current_file = None;
        state.error_message = error;
        if outcome == JobOutcome::Completed {
            state.phase_number = state.total_phases;
            state.phase_current = state.phase_total;
        }

        let snapshot = state.clone();
        info!(
            kind = %self.kind,
            job = ?snapshot.job_id,
            outcome = %outcome,
            files = snapshot.files_processed,
            "job finished"
        );
        self.store.save(&snapshot).await?;
        Ok(snapshot)
    }

    /// Point-in-time copy for progress polling.
    pub async fn snapshot(&self) -> JobState {
        self.inner.lock().await.state.clone()
    }
}

/// Swallows stale progress updates; they are expected under concurrency.
pub(crate) fn drop_stale(result: Result<JobState>) -> Result<()> {
    match result {
        Ok(_) | Err(IntegrityError::StaleUpdate { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}
