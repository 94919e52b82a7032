use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{ModelError, Result};

/// Lifecycle of a single scan result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum ScanStatus {
    #[default]
    Pending,
    Scanning,
    Completed,
    Error,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 4] = [
        ScanStatus::Pending,
        ScanStatus::Scanning,
        ScanStatus::Completed,
        ScanStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Completed => "completed",
            ScanStatus::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "scan status",
                value: s.to_string(),
            })
    }
}

/// Three-way health judgement without its detail text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VerdictKind {
    Healthy,
    Warning,
    Corrupted,
}

impl VerdictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictKind::Healthy => "healthy",
            VerdictKind::Warning => "warning",
            VerdictKind::Corrupted => "corrupted",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict with the diagnostic text that justifies it.
///
/// Warning and corruption details live in separate variants, so a verdict can
/// never carry both at once.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "verdict", rename_all = "snake_case"))]
pub enum Verdict {
    Healthy,
    Warning { details: String },
    Corrupted { details: String },
}

impl Verdict {
    pub fn kind(&self) -> VerdictKind {
        match self {
            Verdict::Healthy => VerdictKind::Healthy,
            Verdict::Warning { .. } => VerdictKind::Warning,
            Verdict::Corrupted { .. } => VerdictKind::Corrupted,
        }
    }

    /// Column values as stored: `(is_corrupted, has_warnings, corruption_details, warning_details)`.
    pub fn columns(&self) -> VerdictColumns<'_> {
        match self {
            Verdict::Healthy => VerdictColumns {
                is_corrupted: false,
                has_warnings: false,
                corruption_details: None,
                warning_details: None,
            },
            Verdict::Warning { details } => VerdictColumns {
                is_corrupted: false,
                has_warnings: true,
                corruption_details: None,
                warning_details: Some(details.as_str()),
            },
            Verdict::Corrupted { details } => VerdictColumns {
                is_corrupted: true,
                has_warnings: false,
                corruption_details: Some(details.as_str()),
                warning_details: None,
            },
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Verdict::Healthy => None,
            Verdict::Warning { details } | Verdict::Corrupted { details } => {
                Some(details.as_str())
            }
        }
    }
}

/// Flattened verdict fields, borrowed from a [`Verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerdictColumns<'a> {
    pub is_corrupted: bool,
    pub has_warnings: bool,
    pub corruption_details: Option<&'a str>,
    pub warning_details: Option<&'a str>,
}

/// Content-identity fields used to tell whether a scanned file changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentIdentity {
    pub size: i64,
    pub modified: Option<DateTime<Utc>>,
    pub hash: Option<String>,
}

impl ContentIdentity {
    /// True when `current` describes different content than `self`.
    ///
    /// Hashes win when both sides have one; otherwise size and modification
    /// time decide.
    pub fn differs_from(&self, current: &ContentIdentity) -> bool {
        if let (Some(stored), Some(now)) = (&self.hash, &current.hash) {
            return stored != now;
        }
        if self.size != current.size {
            return true;
        }
        match (self.modified, current.modified) {
            (Some(stored), Some(now)) => now != stored,
            _ => false,
        }
    }
}

/// One row per distinct file path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ScanResult {
    pub id: i64,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub file_hash: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub discovered_date: Option<DateTime<Utc>>,
    pub scan_status: ScanStatus,
    pub is_corrupted: Option<bool>,
    pub has_warnings: bool,
    pub corruption_details: Option<String>,
    pub warning_details: Option<String>,
    pub scan_tool: Option<String>,
    pub scan_output: Option<String>,
    pub scan_duration: Option<f64>,
    pub scan_date: Option<DateTime<Utc>>,
    pub probe_exit_ok: Option<bool>,
    pub marked_as_good: bool,
    pub claim_token: Option<String>,
    pub version: i64,
}

impl ScanResult {
    /// Verdict exactly as stored, ignoring the manual override.
    pub fn stored_verdict(&self) -> Option<Verdict> {
        if self.scan_status != ScanStatus::Completed {
            return None;
        }
        match self.is_corrupted? {
            true => Some(Verdict::Corrupted {
                details: self.corruption_details.clone().unwrap_or_default(),
            }),
            false if self.has_warnings => Some(Verdict::Warning {
                details: self.warning_details.clone().unwrap_or_default(),
            }),
            false => Some(Verdict::Healthy),
        }
    }

    /// Verdict every read path should surface. `marked_as_good` masks a
    /// corrupted verdict without touching the stored columns.
    pub fn effective_verdict(&self) -> Option<VerdictKind> {
        let stored = self.stored_verdict()?.kind();
        if stored == VerdictKind::Corrupted && self.marked_as_good {
            Some(VerdictKind::Healthy)
        } else {
            Some(stored)
        }
    }

    pub fn is_reported_corrupted(&self) -> bool {
        self.effective_verdict() == Some(VerdictKind::Corrupted)
    }

    pub fn identity(&self) -> ContentIdentity {
        ContentIdentity {
            size: self.file_size.unwrap_or_default(),
            modified: self.last_modified,
            hash: self.file_hash.clone(),
        }
    }

    /// Checks the steady-state field invariants of a row.
    pub fn check_invariants(&self) -> Result<()> {
        if self.is_corrupted.is_some() && self.scan_status != ScanStatus::Completed {
            return Err(ModelError::InvariantViolation(format!(
                "{}: verdict present while status is {}",
                self.file_path, self.scan_status
            )));
        }
        if self.is_corrupted == Some(true) && self.has_warnings {
            return Err(ModelError::InvariantViolation(format!(
                "{}: flagged both corrupted and warning",
                self.file_path
            )));
        }
        if self.has_warnings && self.corruption_details.is_some() {
            return Err(ModelError::InvariantViolation(format!(
                "{}: warning row still carries corruption details",
                self.file_path
            )));
        }
        Ok(())
    }
}
