//! Durable scan-result table.
//!
//! Every state change goes through a guarded `UPDATE`: claims require the row
//! to be `pending`, completions require the caller's claim token, and
//! reclassification requires the version it read. Reads run outside write
//! transactions so a polling caller never blocks the workers.

mod ignored;
mod job_state;
mod query;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixelwarden_model::{ContentIdentity, ScanResult, ScanStatus, Verdict};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Acquire, FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::discovery::DiscoveredFile;
use crate::error::{IntegrityError, Result};

pub use ignored::IgnoredErrorPattern;
pub use job_state::{JobStateStore, MemoryJobStateStore, SqliteJobStateStore};
pub use query::{ResultQuery, VerdictFilter};
pub(crate) use query::SCAN_RESULT_COLUMNS;

const DELETE_CHUNK: usize = 500;

/// Fields written when a worker finishes a probe.
#[derive(Debug, Clone)]
pub struct CompletedScan {
    pub tool: String,
    pub exit_ok: bool,
    /// Output as stored, already truncated.
    pub output: String,
    pub elapsed: Duration,
    pub verdict: Verdict,
}

/// What a discovery batch did to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: u64,
    /// Previously scanned rows sent back to `pending`.
    pub reset: u64,
    pub unchanged: u64,
    /// Rows a worker currently holds; left alone.
    pub in_flight: u64,
}

impl UpsertSummary {
    pub fn writes(&self) -> u64 {
        self.inserted + self.reset
    }

    pub fn merge(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.reset += other.reset;
        self.unchanged += other.unchanged;
        self.in_flight += other.in_flight;
    }
}

/// Row counts by status and by verdict as reported to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct ResultSummary {
    pub total: i64,
    pub pending: i64,
    pub scanning: i64,
    pub completed: i64,
    pub error: i64,
    pub healthy: i64,
    pub warning: i64,
    /// Excludes rows marked as good.
    pub corrupted: i64,
    pub marked_as_good: i64,
}

/// Content identity of a stored row, as read by cleanup.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredIdentity {
    pub id: i64,
    pub file_path: String,
    pub scan_status: ScanStatus,
    pub file_size: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_hash: Option<String>,
    pub version: i64,
}

impl StoredIdentity {
    pub fn identity(&self) -> ContentIdentity {
        ContentIdentity {
            size: self.file_size.unwrap_or_default(),
            modified: self.last_modified,
            hash: self.file_hash.clone(),
        }
    }
}

#[derive(FromRow)]
struct ExistingRow {
    id: i64,
    scan_status: ScanStatus,
    file_size: Option<i64>,
    last_modified: Option<DateTime<Utc>>,
    file_hash: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    /// Opens (creating if needed) the database at `url` in WAL mode.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(2))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| IntegrityError::Internal(format!("Database connection failed: {e}")))?;

        info!(max_connections = max_connections.max(2), "result store pool initialised");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Records a discovery batch on `conn` in a single transaction.
    ///
    /// New paths become `pending`. Scanned rows go back to `pending` when
    /// their content identity changed or `force_rescan` is set. Rows held by
    /// a worker are never touched.
    pub async fn upsert_discovered(
        &self,
        conn: &mut SqliteConnection,
        batch: &[DiscoveredFile],
        force_rescan: bool,
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        if batch.is_empty() {
            return Ok(summary);
        }
        let now = Utc::now();
        let mut tx = conn.begin().await?;

        for file in batch {
            let path = file.path_string();
            let inserted = sqlx::query(
                "INSERT INTO scan_results \
                 (file_path, file_size, file_type, file_hash, last_modified, discovered_date) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(file_path) DO NOTHING",
            )
            .bind(&path)
            .bind(file.identity.size)
            .bind(file.file_type.as_deref())
            .bind(file.identity.hash.as_deref())
            .bind(file.identity.modified)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted > 0 {
                summary.inserted += 1;
                continue;
            }

            let existing: ExistingRow = sqlx::query_as(
                "SELECT id, scan_status, file_size, last_modified, file_hash \
                 FROM scan_results WHERE file_path = ?",
            )
            .bind(&path)
            .fetch_one(&mut *tx)
            .await?;

            let stored = ContentIdentity {
                size: existing.file_size.unwrap_or_default(),
                modified: existing.last_modified,
                hash: existing.file_hash.clone(),
            };
            let changed = stored.differs_from(&file.identity);

            match existing.scan_status {
                ScanStatus::Scanning => summary.in_flight += 1,
                ScanStatus::Pending => {
                    if changed {
                        sqlx::query(
                            "UPDATE scan_results SET file_size = ?, file_hash = ?, \
                             last_modified = ?, version = version + 1 \
                             WHERE id = ? AND scan_status = 'pending'",
                        )
                        .bind(file.identity.size)
                        .bind(file.identity.hash.as_deref())
                        .bind(file.identity.modified)
                        .bind(existing.id)
                        .execute(&mut *tx)
                        .await?;
                    }
                    summary.unchanged += 1;
                }
                ScanStatus::Completed | ScanStatus::Error if changed || force_rescan => {
                    let reset = sqlx::query(&format!(
                        "UPDATE scan_results SET {CLEAR_SCAN_FIELDS}, \
                         file_size = ?, file_hash = ?, last_modified = ? \
                         WHERE id = ? AND scan_status IN ('completed', 'error')"
                    ))
                    .bind(file.identity.size)
                    .bind(file.identity.hash.as_deref())
                    .bind(file.identity.modified)
                    .bind(existing.id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                    summary.reset += reset;
                }
                ScanStatus::Completed | ScanStatus::Error => summary.unchanged += 1,
            }
        }

        tx.commit().await?;
        debug!(
            inserted = summary.inserted,
            reset = summary.reset,
            unchanged = summary.unchanged,
            in_flight = summary.in_flight,
            "discovery batch recorded"
        );
        Ok(summary)
    }

    /// Moves a `pending` row to `scanning` under `token`.
    pub async fn claim(&self, path: &str, token: &str) -> Result<()> {
        let claimed = sqlx::query(
            "UPDATE scan_results SET scan_status = 'scanning', claim_token = ?, \
             version = version + 1 \
             WHERE file_path = ? AND scan_status = 'pending'",
        )
        .bind(token)
        .bind(path)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Err(IntegrityError::ClaimConflict(path.to_string()));
        }
        Ok(())
    }

    /// Writes a verdict for a row this caller still holds.
    pub async fn complete(&self, path: &str, token: &str, record: &CompletedScan) -> Result<()> {
        let columns = record.verdict.columns();
        let updated = sqlx::query(
            "UPDATE scan_results SET scan_status = 'completed', is_corrupted = ?, \
             has_warnings = ?, corruption_details = ?, warning_details = ?, scan_tool = ?, \
             scan_output = ?, scan_duration = ?, scan_date = ?, probe_exit_ok = ?, \
             claim_token = NULL, version = version + 1 \
             WHERE file_path = ? AND claim_token = ? AND scan_status = 'scanning'",
        )
        .bind(columns.is_corrupted)
        .bind(columns.has_warnings)
        .bind(columns.corruption_details)
        .bind(columns.warning_details)
        .bind(&record.tool)
        .bind(&record.output)
        .bind(record.elapsed.as_secs_f64())
        .bind(Utc::now())
        .bind(record.exit_ok)
        .bind(path)
        .bind(token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(IntegrityError::StaleClaim(path.to_string()));
        }
        Ok(())
    }

    /// Marks a held row `error` with the failure text as its output.
    pub async fn fail(
        &self,
        path: &str,
        token: &str,
        output: &str,
        elapsed: Duration,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE scan_results SET scan_status = 'error', is_corrupted = NULL, \
             has_warnings = 0, corruption_details = NULL, warning_details = NULL, \
             scan_output = ?, scan_duration = ?, scan_date = ?, probe_exit_ok = NULL, \
             claim_token = NULL, version = version + 1 \
             WHERE file_path = ? AND claim_token = ? AND scan_status = 'scanning'",
        )
        .bind(output)
        .bind(elapsed.as_secs_f64())
        .bind(Utc::now())
        .bind(path)
        .bind(token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(IntegrityError::StaleClaim(path.to_string()));
        }
        Ok(())
    }

    /// Returns rows stranded in `scanning` by a previous process to `pending`.
    pub async fn release_stale_claims(&self) -> Result<u64> {
        let released = sqlx::query(
            "UPDATE scan_results SET scan_status = 'pending', claim_token = NULL, \
             version = version + 1 WHERE scan_status = 'scanning'",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        if released > 0 {
            info!(released, "released stale scan claims");
        }
        Ok(released)
    }

    pub async fn pending_paths(&self, limit: Option<i64>) -> Result<Vec<String>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT file_path FROM scan_results WHERE scan_status = 'pending' ORDER BY id",
        );
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        let paths = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await?;
        Ok(paths)
    }

    pub async fn get(&self, path: &str) -> Result<Option<ScanResult>> {
        let row = sqlx::query_as::<_, ScanResult>(&format!(
            "SELECT {SCAN_RESULT_COLUMNS} FROM scan_results WHERE file_path = ?"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn query(&self, query: &ResultQuery) -> Result<Vec<ScanResult>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SCAN_RESULT_COLUMNS} FROM scan_results WHERE 1 = 1"
        ));
        query.push_filters(&mut qb);
        qb.push(" ORDER BY id");
        query.push_limit(&mut qb);

        let rows = qb
            .build_query_as::<ScanResult>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn summary(&self) -> Result<ResultSummary> {
        let summary = sqlx::query_as::<_, ResultSummary>(
            "SELECT \
               COUNT(*) AS total, \
               COALESCE(SUM(scan_status = 'pending'), 0) AS pending, \
               COALESCE(SUM(scan_status = 'scanning'), 0) AS scanning, \
               COALESCE(SUM(scan_status = 'completed'), 0) AS completed, \
               COALESCE(SUM(scan_status = 'error'), 0) AS error, \
               COALESCE(SUM(scan_status = 'completed' AND has_warnings = 0 \
                   AND (is_corrupted = 0 OR marked_as_good = 1)), 0) AS healthy, \
               COALESCE(SUM(scan_status = 'completed' AND has_warnings = 1), 0) AS warning, \
               COALESCE(SUM(scan_status = 'completed' AND is_corrupted = 1 \
                   AND marked_as_good = 0), 0) AS corrupted, \
               COALESCE(SUM(marked_as_good = 1), 0) AS marked_as_good \
             FROM scan_results",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }

    /// Content identities of every row, for change detection.
    pub async fn stored_identities(&self) -> Result<Vec<StoredIdentity>> {
        let rows = sqlx::query_as::<_, StoredIdentity>(
            "SELECT id, file_path, scan_status, file_size, last_modified, file_hash, version \
             FROM scan_results ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes rows by path in one transaction. Rows held by a worker are kept.
    pub async fn delete_paths(&self, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in paths.chunks(DELETE_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "DELETE FROM scan_results WHERE scan_status != 'scanning' AND file_path IN (",
            );
            let mut list = qb.separated(", ");
            for path in chunk {
                list.push_bind(path.as_str());
            }
            qb.push(")");
            deleted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        info!(deleted, "deleted scan results");
        Ok(deleted)
    }

    /// Clears every scan field on matching `completed`/`error` rows and puts
    /// them back in `pending`, so the next scan re-probes them.
    pub async fn reset_for_rescan(&self, query: &ResultQuery) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE scan_results SET {CLEAR_SCAN_FIELDS} \
             WHERE scan_status IN ('completed', 'error') AND id IN \
             (SELECT id FROM scan_results WHERE 1 = 1"
        ));
        query.push_filters(&mut qb);
        qb.push(" ORDER BY id");
        query.push_limit(&mut qb);
        qb.push(")");

        let mut tx = self.pool.begin().await?;
        let reset = qb.build().execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        info!(reset, "scan results reset for rescan");
        Ok(reset)
    }

    /// Path-keyed variant of [`ResultStore::reset_for_rescan`].
    pub async fn reset_paths_for_rescan(&self, paths: &[String]) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut reset = 0;
        for chunk in paths.chunks(DELETE_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "UPDATE scan_results SET {CLEAR_SCAN_FIELDS} \
                 WHERE scan_status IN ('completed', 'error') AND file_path IN ("
            ));
            let mut list = qb.separated(", ");
            for path in chunk {
                list.push_bind(path.as_str());
            }
            qb.push(")");
            reset += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(reset)
    }

    /// Flips the manual override. Stored verdict columns are left as they are.
    pub async fn set_marked_as_good(&self, paths: &[String], marked: bool) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for chunk in paths.chunks(DELETE_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE scan_results SET marked_as_good = ");
            qb.push_bind(marked).push(" WHERE file_path IN (");
            let mut list = qb.separated(", ");
            for path in chunk {
                list.push_bind(path.as_str());
            }
            qb.push(")");
            updated += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        debug!(updated, marked, "marked-as-good flag updated");
        Ok(updated)
    }
}

/// `SET` list that returns a row to a freshly discovered state.
const CLEAR_SCAN_FIELDS: &str = "scan_status = 'pending', is_corrupted = NULL, \
     has_warnings = 0, corruption_details = NULL, warning_details = NULL, scan_tool = NULL, \
     scan_output = NULL, scan_duration = NULL, scan_date = NULL, probe_exit_ok = NULL, \
     claim_token = NULL, version = version + 1";
