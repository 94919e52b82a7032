//! Bounded-concurrency execution of probes over a batch of paths.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use pixelwarden_model::VerdictKind;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::classify::{Classifier, ClassifierInput};
use crate::config::{EngineConfig, OutputLimits};
use crate::error::{IntegrityError, Result};
use crate::job::JobTracker;
use crate::probe::{ProbeError, ProbeRouter};
use crate::store::{CompletedScan, ResultStore};

/// Tally of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub healthy: usize,
    pub warning: usize,
    pub corrupted: usize,
    /// Probe crashed, timed out, or the file could not be read.
    pub errored: usize,
    /// Row was not `pending` when claimed.
    pub conflicts: usize,
    /// Claim lost before the result was written.
    pub stale: usize,
    /// Skipped because cancellation was observed first.
    pub not_started: usize,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.healthy + self.warning + self.corrupted
    }

    /// Rows this batch wrote a final state to.
    pub fn writes(&self) -> u64 {
        (self.completed() + self.errored) as u64
    }

    /// Rows the batch touched in any way.
    pub fn attempted(&self) -> usize {
        self.completed() + self.errored + self.conflicts + self.stale
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.healthy += other.healthy;
        self.warning += other.warning;
        self.corrupted += other.corrupted;
        self.errored += other.errored;
        self.conflicts += other.conflicts;
        self.stale += other.stale;
        self.not_started += other.not_started;
    }

    fn absorb(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Scanned(VerdictKind::Healthy) => self.healthy += 1,
            FileOutcome::Scanned(VerdictKind::Warning) => self.warning += 1,
            FileOutcome::Scanned(VerdictKind::Corrupted) => self.corrupted += 1,
            FileOutcome::Errored => self.errored += 1,
            FileOutcome::Conflict => self.conflicts += 1,
            FileOutcome::Stale => self.stale += 1,
            FileOutcome::NotStarted => self.not_started += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Scanned(VerdictKind),
    Errored,
    Conflict,
    Stale,
    NotStarted,
}

#[derive(Clone, Debug)]
pub struct WorkerPool {
    store: ResultStore,
    router: Arc<ProbeRouter>,
    classifier: Arc<Classifier>,
    limits: OutputLimits,
    workers: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        store: ResultStore,
        router: Arc<ProbeRouter>,
        classifier: Arc<Classifier>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            router,
            classifier,
            limits: config.output_limits,
            workers: config.worker_count(),
            timeout: config.probe_timeout(),
        }
    }

    /// Probes every path with at most `workers` in flight.
    ///
    /// Cancellation is checked before each claim; in-flight probes run to
    /// completion or timeout. Per-file problems are counted, store failures
    /// are returned once the batch has drained.
    pub async fn run_batch(
        &self,
        paths: &[String],
        cancel: &CancellationToken,
        tracker: &JobTracker,
    ) -> Result<BatchReport> {
        let outcomes: Vec<Result<FileOutcome>> = stream::iter(paths.to_vec())
            .map(|path| async move { self.process(&path, cancel, tracker).await })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = BatchReport::default();
        let mut first_failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => report.absorb(outcome),
                Err(err) => {
                    first_failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }
        Ok(report)
    }

    async fn process(
        &self,
        path: &str,
        cancel: &CancellationToken,
        tracker: &JobTracker,
    ) -> Result<FileOutcome> {
        if cancel.is_cancelled() {
            return Ok(FileOutcome::NotStarted);
        }

        let token = Uuid::now_v7().to_string();
        match self.store.claim(path, &token).await {
            Ok(()) => {}
            Err(IntegrityError::ClaimConflict(path)) => {
                error!(path = %path, "scan result already claimed; skipping");
                return Ok(FileOutcome::Conflict);
            }
            Err(err) => return Err(err),
        }

        let started = Instant::now();
        let probed = tokio::time::timeout(self.timeout, self.router.probe(Path::new(path))).await;
        let elapsed = started.elapsed();

        let written = match probed {
            Ok(Ok(report)) => {
                let output = self.limits.truncate(&report.raw_output);
                let classification = self.classifier.classify(&ClassifierInput {
                    tool: &report.tool,
                    path,
                    exit_ok: report.exit_ok,
                    output: &output,
                });
                let kind = classification.verdict.kind();
                match kind {
                    VerdictKind::Corrupted => warn!(
                        path = %path,
                        tool = %report.tool,
                        details = classification.verdict.details().unwrap_or_default(),
                        "corrupted file"
                    ),
                    _ => debug!(
                        path = %path,
                        verdict = %kind,
                        rule = %classification.rule,
                        "file classified"
                    ),
                }

                let record = CompletedScan {
                    tool: report.tool,
                    exit_ok: report.exit_ok,
                    output,
                    elapsed: report.elapsed,
                    verdict: classification.verdict,
                };
                self.store
                    .complete(path, &token, &record)
                    .await
                    .map(|()| FileOutcome::Scanned(kind))
            }
            Ok(Err(probe_error)) => self.record_failure(path, &token, probe_error, elapsed).await,
            Err(_) => {
                let probe_error = ProbeError::Timeout {
                    tool: self
                        .router
                        .route(Path::new(path))
                        .map(|probe| probe.tool().to_string())
                        .unwrap_or_else(|| "probe".to_string()),
                    timeout: self.timeout,
                };
                self.record_failure(path, &token, probe_error, elapsed).await
            }
        };

        let outcome = match written {
            Ok(outcome) => outcome,
            Err(IntegrityError::StaleClaim(path)) => {
                warn!(path = %path, "claim lost before result was written");
                FileOutcome::Stale
            }
            Err(err) => return Err(err),
        };

        tracker.record_file(path, elapsed).await;
        Ok(outcome)
    }

    async fn record_failure(
        &self,
        path: &str,
        token: &str,
        probe_error: ProbeError,
        elapsed: Duration,
    ) -> Result<FileOutcome> {
        debug!(path = %path, error = %probe_error, "probe failed");
        let output = self.limits.truncate(&probe_error.as_scan_output());
        self.store
            .fail(path, token, &output, elapsed)
            .await
            .map(|()| FileOutcome::Errored)
    }
}
