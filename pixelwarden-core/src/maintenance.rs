//! Durability and statistics upkeep around bulk writes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::error::Result;

/// Brackets bulk-write phases with relaxed durability and keeps planner
/// statistics fresh.
#[derive(Clone, Debug)]
pub struct MaintenanceCoordinator {
    pool: SqlitePool,
    optimize_every: u64,
    writes_since_optimize: Arc<AtomicU64>,
}

impl MaintenanceCoordinator {
    pub fn new(pool: SqlitePool, optimize_every_writes: u64) -> Self {
        Self {
            pool,
            optimize_every: optimize_every_writes.max(1),
            writes_since_optimize: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs `body` on a dedicated connection with `synchronous = OFF` and
    /// in-memory temp storage.
    ///
    /// The connection is put back to `synchronous = NORMAL` before this
    /// returns, whether `body` succeeds, fails, or panics. A panic is resumed
    /// once settings are restored. Statistics are refreshed after a
    /// successful body.
    pub async fn bulk_write<T, F>(&self, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.pool.acquire().await?;
        if let Err(err) = relax(&mut conn).await {
            if restore(&mut conn).await.is_err() {
                conn.close_on_drop();
            }
            return Err(err);
        }
        debug!("durability relaxed for bulk write");

        let outcome = AssertUnwindSafe(body(&mut *conn)).catch_unwind().await;

        if let Err(err) = restore(&mut conn).await {
            error!(error = %err, "failed to restore durability; discarding connection");
            conn.close_on_drop();
            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
            return Err(err);
        }
        drop(conn);
        debug!("durability restored after bulk write");

        let value = match outcome {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        self.refresh_statistics().await?;
        Ok(value)
    }

    /// `ANALYZE` followed by `PRAGMA optimize`.
    pub async fn refresh_statistics(&self) -> Result<()> {
        sqlx::query("ANALYZE").execute(&self.pool).await?;
        sqlx::query("PRAGMA optimize").execute(&self.pool).await?;
        self.writes_since_optimize.store(0, Ordering::SeqCst);
        info!("database statistics refreshed");
        Ok(())
    }

    /// Counts committed row writes and runs `PRAGMA optimize` whenever the
    /// configured threshold is crossed. Returns whether it ran.
    pub async fn note_writes(&self, writes: u64) -> Result<bool> {
        if writes == 0 {
            return Ok(false);
        }
        let total = self.writes_since_optimize.fetch_add(writes, Ordering::SeqCst) + writes;
        if total < self.optimize_every {
            return Ok(false);
        }
        self.writes_since_optimize.store(0, Ordering::SeqCst);
        sqlx::query("PRAGMA optimize").execute(&self.pool).await?;
        debug!(writes = total, "periodic optimize");
        Ok(true)
    }

    pub fn pending_writes(&self) -> u64 {
        self.writes_since_optimize.load(Ordering::SeqCst)
    }
}

async fn relax(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("PRAGMA synchronous = OFF").execute(&mut *conn).await?;
    sqlx::query("PRAGMA temp_store = MEMORY").execute(&mut *conn).await?;
    Ok(())
}

async fn restore(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
    sqlx::query("PRAGMA temp_store = DEFAULT").execute(&mut *conn).await?;
    Ok(())
}
