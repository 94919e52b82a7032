//! Uniform interface over external inspection tools.

mod command;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{MediaExtensions, MediaFamily};

pub use command::CommandProbe;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("failed to launch {tool}: {message}")]
    Spawn { tool: String, message: String },

    #[error("{tool} exceeded {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("cannot read {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("{tool} reported an error: {message}")]
    Tool { tool: String, message: String },
}

impl ProbeError {
    /// Text persisted into `scan_output` when a probe did not run to completion.
    pub fn as_scan_output(&self) -> String {
        self.to_string()
    }
}

/// What a probe handed back for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub tool: String,
    /// Whether the tool itself signalled success (exit status zero).
    pub exit_ok: bool,
    pub raw_output: String,
    pub elapsed: Duration,
}

/// An external tool that inspects a single media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    fn tool(&self) -> &str;

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;
}

/// Picks the probe for a path by extension family.
#[derive(Clone, Default)]
pub struct ProbeRouter {
    extensions: MediaExtensions,
    by_family: HashMap<MediaFamily, Arc<dyn MediaProbe>>,
    fallback: Option<Arc<dyn MediaProbe>>,
}

impl fmt::Debug for ProbeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut families: Vec<_> = self
            .by_family
            .iter()
            .map(|(family, probe)| (*family, probe.tool().to_string()))
            .collect();
        families.sort_by_key(|(family, _)| *family as u8);
        f.debug_struct("ProbeRouter")
            .field("families", &families)
            .field("fallback", &self.fallback.as_ref().map(|p| p.tool().to_string()))
            .finish()
    }
}

impl ProbeRouter {
    pub fn new(extensions: MediaExtensions) -> Self {
        Self {
            extensions,
            by_family: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with_probe(mut self, family: MediaFamily, probe: Arc<dyn MediaProbe>) -> Self {
        self.by_family.insert(family, probe);
        self
    }

    /// Probe used for paths whose family has no dedicated probe.
    pub fn with_fallback(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.fallback = Some(probe);
        self
    }

    pub fn route(&self, path: &Path) -> Option<Arc<dyn MediaProbe>> {
        let family = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.extensions.family_of(ext));

        family
            .and_then(|family| self.by_family.get(&family).cloned())
            .or_else(|| self.fallback.clone())
    }

    pub async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        match self.route(path) {
            Some(probe) => probe.probe(path).await,
            None => Err(ProbeError::Unreadable {
                path: path.display().to_string(),
                message: "no probe registered for this file type".to_string(),
            }),
        }
    }
}
