use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixelwarden_model::ContentIdentity;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DiscoveredFile, DiscoveryProvider};
use crate::config::{EngineConfig, MediaExtensions};
use crate::error::Result;

const HASH_BUFFER: usize = 1024 * 1024;

/// Walks directory trees with `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FilesystemDiscovery {
    extensions: MediaExtensions,
    hash_contents: bool,
    excluded: Vec<PathBuf>,
    excluded_extensions: Vec<String>,
}

impl FilesystemDiscovery {
    pub fn new(extensions: MediaExtensions) -> Self {
        Self {
            extensions,
            hash_contents: false,
            excluded: Vec::new(),
            excluded_extensions: Vec::new(),
        }
    }

    /// Allow-list and exclusions taken from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.media_extensions.clone())
            .exclude(config.excluded_paths.iter().cloned())
            .exclude_extensions(config.excluded_extensions.iter().cloned())
    }

    /// Also records a SHA-256 of every file. Slow on large libraries.
    pub fn with_content_hash(mut self, enabled: bool) -> Self {
        self.hash_contents = enabled;
        self
    }

    /// Skips everything under these prefixes.
    pub fn exclude(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.excluded.extend(paths);
        self
    }

    /// Skips files with these extensions even when the allow-list has them.
    pub fn exclude_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.excluded_extensions.extend(
            extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase()),
        );
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded.iter().any(|prefix| path.starts_with(prefix))
    }

    fn file_type(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.excluded_extensions.contains(&ext) {
            return None;
        }
        Some(self.extensions.family_of(&ext)?.file_type(&ext))
    }

    async fn read_identity(&self, path: &Path) -> std::io::Result<Option<ContentIdentity>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(md) => md,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        let hash = if self.hash_contents {
            Some(sha256_file(path).await?)
        } else {
            None
        };

        Ok(Some(ContentIdentity {
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            hash,
        }))
    }
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl DiscoveryProvider for FilesystemDiscovery {
    async fn discover(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredFile>> {
        let mut found = Vec::new();
        let mut queue: VecDeque<PathBuf> = roots.iter().cloned().collect();

        while let Some(dir) = queue.pop_front() {
            if cancel.is_cancelled() {
                debug!(found = found.len(), "discovery stopped by cancellation");
                break;
            }
            if self.is_excluded(&dir) {
                continue;
            }

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(path = %dir.display(), error = %err, "stopped listing directory");
                        break;
                    }
                };
                let path = entry.path();
                if self.is_excluded(&path) {
                    continue;
                }
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                        continue;
                    }
                };
                if file_type.is_dir() {
                    queue.push_back(path);
                    continue;
                }
                let Some(kind) = self.file_type(&path) else {
                    continue;
                };
                match self.read_identity(&path).await {
                    Ok(Some(identity)) => found.push(DiscoveredFile {
                        path,
                        identity,
                        file_type: Some(kind),
                    }),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable file");
                    }
                }
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    async fn identity(&self, path: &Path) -> Result<Option<ContentIdentity>> {
        Ok(self.read_identity(path).await?)
    }
}
