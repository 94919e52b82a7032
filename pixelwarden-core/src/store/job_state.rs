use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pixelwarden_model::{JobKind, JobState};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::error::{IntegrityError, Result};

/// Persistence for the per-kind job progress record.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn load(&self, kind: JobKind) -> Result<Option<JobState>>;

    async fn save(&self, state: &JobState) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct SqliteJobStateStore {
    pool: SqlitePool,
}

impl SqliteJobStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStateStore for SqliteJobStateStore {
    async fn load(&self, kind: JobKind) -> Result<Option<JobState>> {
        let state = sqlx::query_as::<_, JobState>(
            "SELECT kind, job_id, is_running, phase, phase_number, phase_current, phase_total, \
             total_phases, files_processed, estimated_total, discovery_count, average_scan_time, \
             start_time, end_time, current_file, progress_message, error_message, \
             cancel_requested, outcome \
             FROM job_state WHERE kind = ?",
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    async fn save(&self, state: &JobState) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_state (kind, job_id, is_running, phase, phase_number, \
             phase_current, phase_total, total_phases, files_processed, estimated_total, \
             discovery_count, average_scan_time, start_time, end_time, current_file, \
             progress_message, error_message, cancel_requested, outcome, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP) \
             ON CONFLICT (kind) DO UPDATE SET \
               job_id = excluded.job_id, \
               is_running = excluded.is_running, \
               phase = excluded.phase, \
               phase_number = excluded.phase_number, \
               phase_current = excluded.phase_current, \
               phase_total = excluded.phase_total, \
               total_phases = excluded.total_phases, \
               files_processed = excluded.files_processed, \
               estimated_total = excluded.estimated_total, \
               discovery_count = excluded.discovery_count, \
               average_scan_time = excluded.average_scan_time, \
               start_time = excluded.start_time, \
               end_time = excluded.end_time, \
               current_file = excluded.current_file, \
               progress_message = excluded.progress_message, \
               error_message = excluded.error_message, \
               cancel_requested = excluded.cancel_requested, \
               outcome = excluded.outcome, \
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(state.kind)
        .bind(state.job_id)
        .bind(state.is_running)
        .bind(state.phase)
        .bind(state.phase_number)
        .bind(state.phase_current)
        .bind(state.phase_total)
        .bind(state.total_phases)
        .bind(state.files_processed)
        .bind(state.estimated_total)
        .bind(state.discovery_count)
        .bind(state.average_scan_time)
        .bind(state.start_time)
        .bind(state.end_time)
        .bind(state.current_file.as_deref())
        .bind(state.progress_message.as_deref())
        .bind(state.error_message.as_deref())
        .bind(state.cancel_requested)
        .bind(state.outcome)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-process store for tests and embedders without a database.
#[derive(Clone, Debug, Default)]
pub struct MemoryJobStateStore {
    states: Arc<Mutex<HashMap<JobKind, JobState>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryJobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `save` fail, simulating a store outage.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn insert(&self, state: JobState) {
        self.states.lock().await.insert(state.kind, state);
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStateStore {
    async fn load(&self, kind: JobKind) -> Result<Option<JobState>> {
        Ok(self.states.lock().await.get(&kind).cloned())
    }

    async fn save(&self, state: &JobState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(IntegrityError::Internal(format!(
                "job state store unavailable for {}",
                state.kind
            )));
        }
        self.states.lock().await.insert(state.kind, state.clone());
        Ok(())
    }
}
