mod support;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use pixelwarden_core::{
    DiscoveredFile, DiscoveryProvider, EngineConfig, IntegrityError, JobController, JobStateStore,
    JobTracker, MediaFamily, MediaProbe, MemoryJobStateStore, ProbeError, ProbeReport,
    ProbeRouter, Progress, ScanRequest, SqliteJobStateStore,
};
use pixelwarden_model::{
    ContentIdentity, JobKind, JobOutcome, JobPhase, JobState, ScanStatus, Verdict,
};
use tokio_util::sync::CancellationToken;

use support::{TestDb, discover, discovered, identity, seed_completed, test_db};

mock! {
    pub Discovery {}

    #[async_trait]
    impl DiscoveryProvider for Discovery {
        async fn discover(
            &self,
            roots: &[PathBuf],
            cancel: &CancellationToken,
        ) -> pixelwarden_core::Result<Vec<DiscoveredFile>>;

        async fn identity(&self, path: &Path) -> pixelwarden_core::Result<Option<ContentIdentity>>;
    }
}

/// Answers from a fixed table; unknown paths fail like a crashed tool.
struct ScriptedProbe {
    delay: Duration,
    outputs: HashMap<String, (bool, String)>,
}

impl ScriptedProbe {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            outputs: HashMap::new(),
        }
    }

    fn answer(mut self, path: &str, exit_ok: bool, output: &str) -> Self {
        self.outputs
            .insert(path.to_string(), (exit_ok, output.to_string()));
        self
    }
}

#[async_trait]
impl MediaProbe for ScriptedProbe {
    fn tool(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        tokio::time::sleep(self.delay).await;
        let key = path.to_string_lossy();
        match self.outputs.get(key.as_ref()) {
            Some((exit_ok, output)) => Ok(ProbeReport {
                tool: "ffmpeg".to_string(),
                exit_ok: *exit_ok,
                raw_output: output.clone(),
                elapsed: self.delay,
            }),
            None => Err(ProbeError::Tool {
                tool: "ffmpeg".to_string(),
                message: "process terminated by signal 11".to_string(),
            }),
        }
    }
}

/// Always fails, the way a decoder bug would take down a worker.
struct PanickingProbe;

#[async_trait]
impl MediaProbe for PanickingProbe {
    fn tool(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        panic!("decoder crashed on {}", path.display())
    }
}

/// Holds discovery open until the run is cancelled, then returns what it
/// had found so far.
struct ParkedDiscovery;

#[async_trait]
impl DiscoveryProvider for ParkedDiscovery {
    async fn discover(
        &self,
        _roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> pixelwarden_core::Result<Vec<DiscoveredFile>> {
        cancel.cancelled().await;
        Ok(vec![discovered("/lib/early.mkv", 1024)])
    }

    async fn identity(&self, _path: &Path) -> pixelwarden_core::Result<Option<ContentIdentity>> {
        Ok(None)
    }
}

fn discovery_of(paths: Vec<&'static str>) -> MockDiscovery {
    let mut discovery = MockDiscovery::new();
    discovery.expect_discover().returning(move |_, _| {
        Ok(paths.iter().map(|path| discovered(path, 1024)).collect())
    });
    discovery
}

fn config(workers: usize, batch: usize) -> EngineConfig {
    EngineConfig {
        worker_count: workers,
        batch_size: batch,
        probe_timeout_secs: 5,
        ..EngineConfig::default()
    }
}

async fn controller(
    db: &TestDb,
    discovery: impl DiscoveryProvider + 'static,
    probe: impl MediaProbe + 'static,
    config: EngineConfig,
) -> anyhow::Result<JobController> {
    let router = ProbeRouter::new(config.media_extensions.clone())
        .with_probe(MediaFamily::Video, Arc::new(probe));
    let controller = JobController::new(
        db.store.clone(),
        Arc::new(SqliteJobStateStore::new(db.store.pool().clone())),
        Arc::new(discovery),
        Arc::new(router),
        config,
    )
    .await?;
    Ok(controller)
}

async fn wait_for_status(db: &TestDb, paths: &[&str], status: ScanStatus) -> anyhow::Result<()> {
    for _ in 0..500 {
        let mut all = true;
        for path in paths {
            let current = db.store.get(path).await?.map(|row| row.scan_status);
            all &= current == Some(status);
        }
        if all {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("rows never reached {status:?}")
}

async fn wait_for_progress(controller: &JobController, kind: JobKind, files: i64) -> JobState {
    for _ in 0..500 {
        let state = controller.snapshot(kind).await;
        if state.files_processed >= files {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never processed {files} files");
}

#[tokio::test]
async fn scan_runs_every_phase_and_records_verdicts() -> anyhow::Result<()> {
    let db = test_db().await?;
    let probe = ScriptedProbe::new(Duration::from_millis(1))
        .answer("/lib/clean.mkv", true, "")
        .answer(
            "/lib/noisy.mkv",
            true,
            "[h264 @ 0x1] Invalid NAL unit 0, skipping.",
        )
        .answer(
            "/lib/broken.mkv",
            false,
            "[matroska @ 0x2] Error while decoding stream #0:0: Invalid data found",
        );
    let discovery = discovery_of(vec![
        "/lib/clean.mkv",
        "/lib/noisy.mkv",
        "/lib/broken.mkv",
        "/lib/crashes.mkv",
    ]);
    let controller = controller(&db, discovery, probe, config(2, 2)).await?;

    let handle = controller
        .start_scan(ScanRequest::new([PathBuf::from("/lib")]))
        .await?;
    let job_id = handle.job_id();
    assert_eq!(handle.wait().await?, JobOutcome::Completed);

    let state = controller.snapshot(JobKind::Scan).await;
    assert!(!state.is_running);
    assert_eq!(state.job_id, Some(job_id));
    assert_eq!(state.phase, JobPhase::Completed);
    assert_eq!(state.outcome, Some(JobOutcome::Completed));
    assert_eq!(state.phase_number, state.total_phases);
    assert_eq!(state.files_processed, 4);
    assert_eq!(state.discovery_count, 4);
    assert!(state.average_scan_time.is_some());
    assert!(state.end_time.is_some());

    let persisted = SqliteJobStateStore::new(db.store.pool().clone())
        .load(JobKind::Scan)
        .await?
        .expect("persisted state");
    assert_eq!(persisted.outcome, Some(JobOutcome::Completed));
    assert!(!persisted.is_running);

    let summary = db.store.summary().await?;
    assert_eq!(summary.total, 4);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.error, 1);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.warning, 1);
    assert_eq!(summary.corrupted, 1);
    assert_eq!(summary.scanning, 0);

    let crashed = db.store.get("/lib/crashes.mkv").await?.expect("row");
    assert_eq!(crashed.scan_status, ScanStatus::Error);
    assert!(crashed.scan_output.unwrap_or_default().contains("signal 11"));
    Ok(())
}

#[tokio::test]
async fn unchanged_files_are_not_probed_again() -> anyhow::Result<()> {
    let db = test_db().await?;
    let probe = ScriptedProbe::new(Duration::ZERO).answer("/lib/a.mkv", true, "");
    let controller = controller(&db, discovery_of(vec!["/lib/a.mkv"]), probe, config(1, 8)).await?;

    let first = controller.start_scan(ScanRequest::new([PathBuf::from("/lib")])).await?;
    assert_eq!(first.wait().await?, JobOutcome::Completed);
    let scanned = db.store.get("/lib/a.mkv").await?.expect("row");

    let second = controller.start_scan(ScanRequest::new([PathBuf::from("/lib")])).await?;
    assert_eq!(second.wait().await?, JobOutcome::Completed);
    assert_eq!(controller.snapshot(JobKind::Scan).await.files_processed, 0);
    assert_eq!(db.store.get("/lib/a.mkv").await?.expect("row"), scanned);

    let forced = controller
        .start_scan(ScanRequest::new([PathBuf::from("/lib")]).force_rescan(true))
        .await?;
    assert_eq!(forced.wait().await?, JobOutcome::Completed);
    assert_eq!(controller.snapshot(JobKind::Scan).await.files_processed, 1);
    Ok(())
}

#[tokio::test]
async fn second_start_is_rejected_without_touching_the_run() -> anyhow::Result<()> {
    let db = test_db().await?;
    let mut probe = ScriptedProbe::new(Duration::from_millis(100));
    let paths: Vec<&'static str> = vec!["/lib/1.mkv", "/lib/2.mkv", "/lib/3.mkv"];
    for path in &paths {
        probe = probe.answer(path, true, "");
    }
    let controller = controller(&db, discovery_of(paths), probe, config(1, 1)).await?;

    let handle = controller.start_scan(ScanRequest::default()).await?;
    let before = controller.snapshot(JobKind::Scan).await;

    let second = controller.start_scan(ScanRequest::default()).await;
    assert!(matches!(second, Err(IntegrityError::AlreadyRunning(JobKind::Scan))));

    let after = controller.snapshot(JobKind::Scan).await;
    assert_eq!(after.job_id, before.job_id);
    assert!(after.is_running);

    assert_eq!(handle.wait().await?, JobOutcome::Completed);
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_new_claims() -> anyhow::Result<()> {
    let db = test_db().await?;
    let mut probe = ScriptedProbe::new(Duration::from_millis(40));
    let paths: Vec<&'static str> = vec![
        "/lib/01.mkv", "/lib/02.mkv", "/lib/03.mkv", "/lib/04.mkv", "/lib/05.mkv",
        "/lib/06.mkv", "/lib/07.mkv", "/lib/08.mkv", "/lib/09.mkv", "/lib/10.mkv",
        "/lib/11.mkv", "/lib/12.mkv", "/lib/13.mkv", "/lib/14.mkv", "/lib/15.mkv",
        "/lib/16.mkv", "/lib/17.mkv", "/lib/18.mkv", "/lib/19.mkv", "/lib/20.mkv",
    ];
    for path in &paths {
        probe = probe.answer(path, true, "");
    }
    let controller = controller(&db, discovery_of(paths), probe, config(1, 2)).await?;

    let handle = controller.start_scan(ScanRequest::default()).await?;
    wait_for_progress(&controller, JobKind::Scan, 1).await;
    assert!(controller.request_cancel(JobKind::Scan).await?);
    assert!(controller.request_cancel(JobKind::Scan).await?, "repeat requests are harmless");

    assert_eq!(handle.wait().await?, JobOutcome::Cancelled);

    let state = controller.snapshot(JobKind::Scan).await;
    assert!(!state.is_running);
    assert!(state.cancel_requested);
    assert_eq!(state.phase, JobPhase::Cancelled);
    assert_eq!(state.outcome, Some(JobOutcome::Cancelled));

    let summary = db.store.summary().await?;
    assert_eq!(summary.scanning, 0);
    assert!(summary.pending > 0);
    assert_eq!(summary.completed, state.files_processed);
    assert_eq!(summary.completed + summary.pending, 20);

    assert!(!controller.request_cancel(JobKind::Scan).await?);
    Ok(())
}

#[tokio::test]
async fn restart_closes_out_interrupted_runs() -> anyhow::Result<()> {
    let db = test_db().await?;
    let state_store = SqliteJobStateStore::new(db.store.pool().clone());
    let mut crashed = JobState::idle(JobKind::Scan);
    crashed.is_running = true;
    crashed.phase = JobPhase::Scanning;
    crashed.phase_number = 2;
    state_store.save(&crashed).await?;

    discover(&db.store, &["/lib/held.mkv"]).await?;
    db.store.claim("/lib/held.mkv", "worker-from-dead-process").await?;

    let probe = ScriptedProbe::new(Duration::ZERO).answer("/lib/held.mkv", true, "");
    let discovery = discovery_of(vec!["/lib/held.mkv"]);
    let controller = controller(&db, discovery, probe, config(1, 4)).await?;

    let recovered = controller.snapshot(JobKind::Scan).await;
    assert!(!recovered.is_running);
    assert_eq!(recovered.phase, JobPhase::Interrupted);
    assert_eq!(recovered.outcome, Some(JobOutcome::Interrupted));

    let row = db.store.get("/lib/held.mkv").await?.expect("row");
    assert_eq!(row.scan_status, ScanStatus::Pending);

    let handle = controller.start_scan(ScanRequest::default()).await?;
    assert_eq!(handle.wait().await?, JobOutcome::Completed);
    assert_eq!(
        db.store.get("/lib/held.mkv").await?.expect("row").scan_status,
        ScanStatus::Completed
    );
    Ok(())
}

#[tokio::test]
async fn cleanup_removes_orphans_and_requeues_changed_files() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = &db.store;
    seed_completed(store, "/lib/kept.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;
    seed_completed(store, "/lib/gone.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;
    seed_completed(store, "/lib/edited.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;

    let mut discovery = MockDiscovery::new();
    discovery.expect_identity().returning(|path| {
        Ok(match path.to_string_lossy().as_ref() {
            "/lib/kept.mkv" => Some(identity(1024)),
            "/lib/edited.mkv" => Some(identity(2048)),
            _ => None,
        })
    });
    let probe = ScriptedProbe::new(Duration::ZERO);
    let controller = controller(&db, discovery, probe, config(2, 2)).await?;

    let handle = controller.start_cleanup().await?;
    assert_eq!(handle.kind(), JobKind::Cleanup);
    assert_eq!(handle.wait().await?, JobOutcome::Completed);

    assert!(store.get("/lib/gone.mkv").await?.is_none());
    assert_eq!(
        store.get("/lib/edited.mkv").await?.expect("row").scan_status,
        ScanStatus::Pending
    );
    assert_eq!(
        store.get("/lib/kept.mkv").await?.expect("row").scan_status,
        ScanStatus::Completed
    );

    let state = controller.snapshot(JobKind::Cleanup).await;
    assert_eq!(state.files_processed, 3);
    assert_eq!(state.outcome, Some(JobOutcome::Completed));
    assert!(
        state
            .progress_message
            .unwrap_or_default()
            .contains("1 orphaned results removed")
    );
    assert_eq!(controller.snapshot(JobKind::Scan).await.outcome, None);
    Ok(())
}

#[tokio::test]
async fn discovery_failure_fails_the_job() -> anyhow::Result<()> {
    let db = test_db().await?;
    let mut discovery = MockDiscovery::new();
    discovery
        .expect_discover()
        .returning(|_, _| Err(IntegrityError::Internal("library root unmounted".to_string())));
    let probe = ScriptedProbe::new(Duration::ZERO);
    let controller = controller(&db, discovery, probe, config(1, 1)).await?;

    let handle = controller.start_scan(ScanRequest::default()).await?;
    assert_eq!(handle.wait().await?, JobOutcome::Failed);

    let state = controller.snapshot(JobKind::Scan).await;
    assert!(!state.is_running);
    assert_eq!(state.phase, JobPhase::Failed);
    assert!(
        state
            .error_message
            .unwrap_or_default()
            .contains("library root unmounted")
    );
    Ok(())
}

fn tracker() -> (JobTracker, MemoryJobStateStore) {
    let store = MemoryJobStateStore::new();
    (JobTracker::new(JobKind::Scan, Arc::new(store.clone()), 0.2), store)
}

#[tokio::test]
async fn stale_progress_is_rejected_and_leaves_state_alone() -> anyhow::Result<()> {
    let (tracker, _) = tracker();
    tracker.start().await?;
    tracker
        .advance(Progress::new(JobPhase::Scanning, 2, 5, 10))
        .await?;

    let behind = tracker
        .advance(Progress::new(JobPhase::Discovering, 1, 9, 9))
        .await;
    assert!(matches!(
        behind,
        Err(IntegrityError::StaleUpdate {
            current: 2,
            attempted: 1,
            ..
        })
    ));

    let regress = tracker.advance(Progress::new(JobPhase::Scanning, 2, 3, 10)).await;
    assert!(matches!(regress, Err(IntegrityError::StaleUpdate { .. })));

    let state = tracker.snapshot().await;
    assert_eq!(state.phase, JobPhase::Scanning);
    assert_eq!(state.phase_current, 5);
    Ok(())
}

#[tokio::test]
async fn failed_start_keeps_the_previous_record() -> anyhow::Result<()> {
    let (tracker, store) = tracker();
    let before = tracker.snapshot().await;

    store.fail_saves(true);
    assert!(tracker.start().await.is_err());
    assert_eq!(tracker.snapshot().await, before);

    store.fail_saves(false);
    let run = tracker.start().await?;
    assert_eq!(tracker.snapshot().await.job_id, Some(run.job_id));
    assert!(matches!(
        tracker.start().await,
        Err(IntegrityError::AlreadyRunning(JobKind::Scan))
    ));
    Ok(())
}

#[tokio::test]
async fn progress_outside_a_run_is_refused() {
    let (tracker, _) = tracker();
    let result = tracker
        .advance(Progress::new(JobPhase::Scanning, 2, 0, 1))
        .await;
    assert!(matches!(result, Err(IntegrityError::NotRunning(JobKind::Scan))));
    assert!(!tracker.request_cancel().await.unwrap_or(true));
}

#[tokio::test]
async fn cancelling_during_discovery_records_nothing() -> anyhow::Result<()> {
    let db = test_db().await?;
    let probe = ScriptedProbe::new(Duration::ZERO);
    let controller = controller(&db, ParkedDiscovery, probe, config(1, 4)).await?;

    let handle = controller
        .start_scan(ScanRequest::new([PathBuf::from("/lib")]))
        .await?;
    assert_eq!(controller.snapshot(JobKind::Scan).await.phase, JobPhase::Discovering);
    assert!(controller.request_cancel(JobKind::Scan).await?);

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle.wait()).await??;
    assert_eq!(outcome, JobOutcome::Cancelled);

    let state = controller.snapshot(JobKind::Scan).await;
    assert!(!state.is_running);
    assert_eq!(state.phase, JobPhase::Cancelled);
    assert_eq!(state.files_processed, 0);
    assert_eq!(db.store.summary().await?.total, 0);
    Ok(())
}

#[tokio::test]
async fn panicking_decoder_fails_the_scan_and_frees_the_kind() -> anyhow::Result<()> {
    let db = test_db().await?;
    let discovery = discovery_of(vec!["/lib/a.mkv"]);
    let controller = controller(&db, discovery, PanickingProbe, config(1, 1)).await?;

    let handle = controller.start_scan(ScanRequest::default()).await?;
    assert_eq!(handle.wait().await?, JobOutcome::Failed);

    let state = controller.snapshot(JobKind::Scan).await;
    assert!(!state.is_running);
    assert_eq!(state.phase, JobPhase::Failed);
    assert!(state.error_message.unwrap_or_default().contains("decoder crashed"));
    assert_eq!(
        db.store.get("/lib/a.mkv").await?.expect("row").scan_status,
        ScanStatus::Pending
    );

    let again = controller.start_scan(ScanRequest::default()).await?;
    assert_eq!(again.wait().await?, JobOutcome::Failed);
    Ok(())
}

#[tokio::test]
async fn cleanup_skips_files_it_cannot_read() -> anyhow::Result<()> {
    let db = test_db().await?;
    let store = &db.store;
    seed_completed(store, "/lib/kept.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;
    seed_completed(store, "/lib/gone.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;
    seed_completed(store, "/lib/denied.mkv", "ffmpeg", true, "", Verdict::Healthy).await?;

    let mut discovery = MockDiscovery::new();
    discovery.expect_identity().returning(|path| {
        match path.to_string_lossy().as_ref() {
            "/lib/kept.mkv" => Ok(Some(identity(1024))),
            "/lib/denied.mkv" => Err(IntegrityError::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            ))),
            _ => Ok(None),
        }
    });
    let probe = ScriptedProbe::new(Duration::ZERO);
    let controller = controller(&db, discovery, probe, config(2, 2)).await?;

    let handle = controller.start_cleanup().await?;
    assert_eq!(handle.wait().await?, JobOutcome::Completed);

    assert!(store.get("/lib/gone.mkv").await?.is_none());
    for path in ["/lib/kept.mkv", "/lib/denied.mkv"] {
        assert_eq!(
            store.get(path).await?.expect("row").scan_status,
            ScanStatus::Completed
        );
    }
    assert_eq!(controller.snapshot(JobKind::Cleanup).await.files_processed, 3);
    Ok(())
}

#[tokio::test]
async fn cleanup_during_a_scan_leaves_claimed_rows_alone() -> anyhow::Result<()> {
    let db = test_db().await?;
    let probe = ScriptedProbe::new(Duration::from_millis(500))
        .answer("/lib/a.mkv", true, "")
        .answer("/lib/b.mkv", true, "");
    let mut discovery = MockDiscovery::new();
    discovery.expect_discover().returning(|_, _| {
        Ok(vec![discovered("/lib/a.mkv", 1024), discovered("/lib/b.mkv", 1024)])
    });
    // One claimed file vanished, the other changed on disk.
    discovery.expect_identity().returning(|path| {
        Ok(match path.to_string_lossy().as_ref() {
            "/lib/b.mkv" => Some(identity(4096)),
            _ => None,
        })
    });
    let controller = controller(&db, discovery, probe, config(2, 2)).await?;

    let scan = controller.start_scan(ScanRequest::default()).await?;
    let claimed = ["/lib/a.mkv", "/lib/b.mkv"];
    wait_for_status(&db, &claimed, ScanStatus::Scanning).await?;

    let cleanup = controller.start_cleanup().await?;
    assert_eq!(cleanup.wait().await?, JobOutcome::Completed);
    for path in claimed {
        assert_eq!(
            db.store.get(path).await?.expect("row").scan_status,
            ScanStatus::Scanning
        );
    }

    assert_eq!(scan.wait().await?, JobOutcome::Completed);
    for path in claimed {
        assert_eq!(
            db.store.get(path).await?.expect("row").scan_status,
            ScanStatus::Completed
        );
    }
    Ok(())
}

#[tokio::test]
async fn targeted_scan_only_checks_the_requested_files() -> anyhow::Result<()> {
    let db = test_db().await?;
    discover(&db.store, &["/lib/other.mkv"]).await?;

    let mut discovery = MockDiscovery::new();
    discovery.expect_discover().never();
    discovery.expect_identity().returning(|path| {
        Ok(match path.to_string_lossy().as_ref() {
            "/lib/a.mkv" => Some(identity(1024)),
            _ => None,
        })
    });
    let probe = ScriptedProbe::new(Duration::ZERO)
        .answer("/lib/a.mkv", true, "")
        .answer("/lib/other.mkv", true, "");
    let controller = controller(&db, discovery, probe, config(1, 4)).await?;

    let request = ScanRequest::files([
        PathBuf::from("/lib/a.mkv"),
        PathBuf::from("/lib/gone.mkv"),
        PathBuf::from("/lib/notes.txt"),
    ]);
    let handle = controller.start_scan(request).await?;
    assert_eq!(handle.wait().await?, JobOutcome::Completed);

    let state = controller.snapshot(JobKind::Scan).await;
    assert_eq!(state.discovery_count, 1);
    assert_eq!(state.files_processed, 1);

    let scanned = db.store.get("/lib/a.mkv").await?.expect("row");
    assert_eq!(scanned.scan_status, ScanStatus::Completed);
    assert_eq!(scanned.file_type.as_deref(), Some("video/mkv"));
    assert_eq!(
        db.store.get("/lib/other.mkv").await?.expect("row").scan_status,
        ScanStatus::Pending
    );
    assert!(db.store.get("/lib/gone.mkv").await?.is_none());
    assert!(db.store.get("/lib/notes.txt").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn configured_exclusions_are_never_recorded() -> anyhow::Result<()> {
    let db = test_db().await?;
    let discovery = discovery_of(vec!["/lib/a.mkv", "/lib/b.avi", "/lib/trash/c.mkv"]);
    let probe = ScriptedProbe::new(Duration::ZERO).answer("/lib/a.mkv", true, "");
    let config = EngineConfig {
        excluded_paths: vec![PathBuf::from("/lib/trash")],
        excluded_extensions: vec!["avi".to_string()],
        ..config(1, 4)
    };
    let controller = controller(&db, discovery, probe, config).await?;

    let handle = controller.start_scan(ScanRequest::new([PathBuf::from("/lib")])).await?;
    assert_eq!(handle.wait().await?, JobOutcome::Completed);

    let summary = db.store.summary().await?;
    assert_eq!(summary.total, 1);
    assert_eq!(summary.healthy, 1);
    assert!(db.store.get("/lib/b.avi").await?.is_none());
    Ok(())
}
