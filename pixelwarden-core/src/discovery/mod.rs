//! Source of the candidate file set and of per-file content identity.

mod fs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pixelwarden_model::ContentIdentity;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use fs::FilesystemDiscovery;

/// A media file found under one of the scan roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub identity: ContentIdentity,
    /// `family/extension`, for example `video/mkv`.
    pub file_type: Option<String>,
}

impl DiscoveredFile {
    pub fn new(path: impl Into<PathBuf>, identity: ContentIdentity) -> Self {
        Self {
            path: path.into(),
            identity,
            file_type: None,
        }
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Lists supported media files under `roots`. Stops early, returning what
    /// it has, once `cancel` fires.
    async fn discover(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredFile>>;

    /// Current identity of `path`, or `None` when the file no longer exists.
    async fn identity(&self, path: &Path) -> Result<Option<ContentIdentity>>;
}
