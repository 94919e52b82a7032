use futures::FutureExt;
use pixelwarden_core::{IntegrityError, MaintenanceCoordinator};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// One-connection pool, so every check sees the connection the bulk write used.
async fn single_connection_pool() -> anyhow::Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("maintenance.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(&pool)
        .await?;
    Ok((pool, dir))
}

async fn synchronous(pool: &SqlitePool) -> anyhow::Result<i64> {
    Ok(sqlx::query_scalar("PRAGMA synchronous").fetch_one(pool).await?)
}

#[tokio::test]
async fn durability_is_relaxed_only_inside_the_body() -> anyhow::Result<()> {
    let (pool, _dir) = single_connection_pool().await?;
    let coordinator = MaintenanceCoordinator::new(pool.clone(), 100);

    let inside = coordinator
        .bulk_write(|conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO items (name) VALUES ('a'), ('b')")
                    .execute(&mut *conn)
                    .await?;
                let level: i64 = sqlx::query_scalar("PRAGMA synchronous")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok(level)
            })
        })
        .await?;

    assert_eq!(inside, 0, "OFF while the body runs");
    assert_eq!(synchronous(&pool).await?, 1, "NORMAL afterwards");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 2);
    Ok(())
}

#[tokio::test]
async fn durability_is_restored_after_an_error() -> anyhow::Result<()> {
    let (pool, _dir) = single_connection_pool().await?;
    let coordinator = MaintenanceCoordinator::new(pool.clone(), 100);

    let result: pixelwarden_core::Result<()> = coordinator
        .bulk_write(|conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO missing_table (x) VALUES (1)")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await;

    assert!(matches!(result, Err(IntegrityError::Database(_))));
    assert_eq!(synchronous(&pool).await?, 1);
    Ok(())
}

#[tokio::test]
async fn durability_is_restored_after_a_panic() -> anyhow::Result<()> {
    let (pool, _dir) = single_connection_pool().await?;
    let coordinator = MaintenanceCoordinator::new(pool.clone(), 100);

    let outcome = std::panic::AssertUnwindSafe(coordinator.bulk_write(|_conn| {
        Box::pin(async move {
            if true {
                panic!("writer blew up");
            }
            Ok(())
        })
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err(), "the panic reaches the caller");
    assert_eq!(synchronous(&pool).await?, 1);
    Ok(())
}

#[tokio::test]
async fn optimize_runs_once_the_write_threshold_is_crossed() -> anyhow::Result<()> {
    let (pool, _dir) = single_connection_pool().await?;
    let coordinator = MaintenanceCoordinator::new(pool, 10);

    assert!(!coordinator.note_writes(4).await?);
    assert!(!coordinator.note_writes(0).await?);
    assert_eq!(coordinator.pending_writes(), 4);
    assert!(coordinator.note_writes(6).await?);
    assert_eq!(coordinator.pending_writes(), 0);

    coordinator.note_writes(3).await?;
    coordinator.refresh_statistics().await?;
    assert_eq!(coordinator.pending_writes(), 0);
    Ok(())
}
