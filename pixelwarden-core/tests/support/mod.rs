#![allow(dead_code)]

use std::time::Duration;

use chrono::{TimeZone, Utc};
use pixelwarden_core::DiscoveredFile;
use pixelwarden_core::ResultStore;
use pixelwarden_core::store::CompletedScan;
use pixelwarden_model::{ContentIdentity, Verdict};
use tempfile::TempDir;

/// A migrated store backed by a throwaway database file.
pub struct TestDb {
    pub store: ResultStore,
    _dir: TempDir,
}

pub async fn test_db() -> anyhow::Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("pixelwarden.db").display());
    let store = ResultStore::connect(&url, 4).await?;
    store.migrate().await?;
    Ok(TestDb { store, _dir: dir })
}

pub fn identity(size: i64) -> ContentIdentity {
    ContentIdentity {
        size,
        modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single(),
        hash: None,
    }
}

pub fn discovered(path: &str, size: i64) -> DiscoveredFile {
    DiscoveredFile::new(path, identity(size)).with_file_type("video/mkv")
}

/// Records `paths` as freshly discovered files.
pub async fn discover(store: &ResultStore, paths: &[&str]) -> anyhow::Result<()> {
    let batch: Vec<DiscoveredFile> = paths.iter().map(|path| discovered(path, 1024)).collect();
    let mut conn = store.pool().acquire().await?;
    store.upsert_discovered(&mut conn, &batch, false).await?;
    Ok(())
}

/// Drives `path` through discovery, claim and completion.
pub async fn seed_completed(
    store: &ResultStore,
    path: &str,
    tool: &str,
    exit_ok: bool,
    output: &str,
    verdict: Verdict,
) -> anyhow::Result<()> {
    discover(store, &[path]).await?;
    store.claim(path, "seed-token").await?;
    store
        .complete(
            path,
            "seed-token",
            &CompletedScan {
                tool: tool.to_string(),
                exit_ok,
                output: output.to_string(),
                elapsed: Duration::from_millis(120),
                verdict,
            },
        )
        .await?;
    Ok(())
}
