use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global knobs that tune the scan engine.
///
/// All fields carry defaults so deployments can override a single value
/// without supplying a full configuration payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of files probed concurrently inside a batch.
    pub worker_count: usize,
    /// Files handed to the worker pool per checkpoint. Progress is persisted
    /// once per batch, so smaller batches refresh the UI more often at the
    /// cost of extra writes.
    pub batch_size: usize,
    /// A probe running longer than this is abandoned and the file marked `error`.
    pub probe_timeout_secs: u64,
    /// Weight of the newest sample in the scan-time moving average.
    pub eta_smoothing: f64,
    /// Run `PRAGMA optimize` after this many committed row writes.
    pub optimize_every_writes: u64,
    /// Caps applied to raw probe output before it is classified and stored.
    pub output_limits: OutputLimits,
    /// File extensions (lowercase, no dot) grouped by probe family.
    pub media_extensions: MediaExtensions,
    /// Directory prefixes never walked or scanned.
    pub excluded_paths: Vec<PathBuf>,
    /// Extensions skipped even when `media_extensions` lists them.
    pub excluded_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().clamp(1, 8),
            batch_size: 32,
            probe_timeout_secs: 300,
            eta_smoothing: 0.2,
            optimize_every_writes: 10_000,
            output_limits: OutputLimits::default(),
            media_extensions: MediaExtensions::default(),
            excluded_paths: Vec::new(),
            excluded_extensions: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.max(1)
    }

    /// True when `path` sits under an excluded prefix or carries an
    /// excluded extension.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.excluded_extensions
                    .iter()
                    .any(|excluded| excluded.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    /// Media family of `path` when it is scannable under this configuration.
    pub fn scannable_family(&self, path: &Path) -> Option<MediaFamily> {
        if self.is_excluded(path) {
            return None;
        }
        let ext = path.extension()?.to_str()?;
        self.media_extensions.family_of(ext)
    }

    pub fn eta_smoothing(&self) -> f64 {
        if self.eta_smoothing.is_finite() {
            self.eta_smoothing.clamp(0.01, 1.0)
        } else {
            0.2
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLimits {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_lines: 200,
            max_chars: 20_000,
        }
    }
}

impl OutputLimits {
    /// Keep the first `max_lines` lines, then cut at `max_chars` on a char
    /// boundary. A marker line notes that text was dropped.
    pub fn truncate(&self, raw: &str) -> String {
        let total_lines = raw.lines().count();
        let mut out = raw
            .lines()
            .take(self.max_lines)
            .collect::<Vec<_>>()
            .join("\n");
        let mut truncated = total_lines > self.max_lines;

        if out.chars().count() > self.max_chars {
            out = out.chars().take(self.max_chars).collect();
            truncated = true;
        }
        if truncated {
            out.push_str("\n... (output truncated)");
        }
        out
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaExtensions {
    pub image: Vec<String>,
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl Default for MediaExtensions {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            image: owned(&[
                "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic",
                "heif",
            ]),
            video: owned(&[
                "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg",
                "mpeg", "ts", "m2ts",
            ]),
            audio: owned(&[
                "mp3", "flac", "wav", "aac", "ogg", "m4a", "wma", "opus",
            ]),
        }
    }
}

/// Probe family a file belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFamily {
    Image,
    Video,
    Audio,
}

impl MediaFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFamily::Image => "image",
            MediaFamily::Video => "video",
            MediaFamily::Audio => "audio",
        }
    }

    /// `family/extension` label stored as a row's file type.
    pub fn file_type(&self, extension: &str) -> String {
        format!("{}/{}", self.as_str(), extension.to_ascii_lowercase())
    }
}

impl MediaExtensions {
    pub fn family_of(&self, extension: &str) -> Option<MediaFamily> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if self.image.iter().any(|e| *e == ext) {
            Some(MediaFamily::Image)
        } else if self.video.iter().any(|e| *e == ext) {
            Some(MediaFamily::Video)
        } else if self.audio.iter().any(|e| *e == ext) {
            Some(MediaFamily::Audio)
        } else {
            None
        }
    }

    pub fn is_supported(&self, extension: &str) -> bool {
        self.family_of(extension).is_some()
    }
}
