use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ModelError, Result};

/// The two long-running job kinds. At most one of each runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum JobKind {
    /// Discover media files and probe every pending one.
    Scan,
    /// Find orphaned rows and files whose content changed since their scan.
    Cleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Scan, JobKind::Cleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scan => "scan",
            JobKind::Cleanup => "cleanup",
        }
    }

    /// Relative share of overall progress each phase represents.
    pub fn phase_weights(&self) -> &'static [f64] {
        match self {
            JobKind::Scan => &[0.2, 0.75, 0.05],
            JobKind::Cleanup => &[0.1, 0.8, 0.1],
        }
    }

    pub fn total_phases(&self) -> i64 {
        self.phase_weights().len() as i64
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::UnknownVariant {
                kind: "job kind",
                value: s.to_string(),
            })
    }
}

/// Phase labels a job moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum JobPhase {
    #[default]
    Idle,
    Discovering,
    Scanning,
    CheckingFiles,
    Reconciling,
    Finalizing,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
    Interrupted,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Discovering => "discovering",
            JobPhase::Scanning => "scanning",
            JobPhase::CheckingFiles => "checking_files",
            JobPhase::Reconciling => "reconciling",
            JobPhase::Finalizing => "finalizing",
            JobPhase::Cancelling => "cancelling",
            JobPhase::Completed => "completed",
            JobPhase::Cancelled => "cancelled",
            JobPhase::Failed => "failed",
            JobPhase::Interrupted => "interrupted",
        }
    }

    /// Phases a job can sit in while `is_running` is false.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Idle
                | JobPhase::Completed
                | JobPhase::Cancelled
                | JobPhase::Failed
                | JobPhase::Interrupted
        )
    }

    /// Forward transitions allowed while a job is running. Terminal phases are
    /// only reachable through a job's finish path.
    pub fn can_transition_to(&self, next: JobPhase) -> bool {
        use JobPhase::*;

        if *self == next {
            return !self.is_terminal();
        }
        if next == Cancelling {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Discovering)
                | (Completed, Discovering)
                | (Cancelled, Discovering)
                | (Failed, Discovering)
                | (Interrupted, Discovering)
                | (Discovering, Scanning)
                | (Discovering, CheckingFiles)
                | (Discovering, Finalizing)
                | (Scanning, Finalizing)
                | (CheckingFiles, Reconciling)
                | (CheckingFiles, Finalizing)
                | (Reconciling, Finalizing)
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed,
    /// The process stopped while the job was still marked running.
    Interrupted,
}

impl JobOutcome {
    pub fn terminal_phase(&self) -> JobPhase {
        match self {
            JobOutcome::Completed => JobPhase::Completed,
            JobOutcome::Cancelled => JobPhase::Cancelled,
            JobOutcome::Failed => JobPhase::Failed,
            JobOutcome::Interrupted => JobPhase::Interrupted,
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.terminal_phase().as_str())
    }
}

/// Durable progress record for one job kind.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct JobState {
    pub kind: JobKind,
    pub job_id: Option<Uuid>,
    pub is_running: bool,
    pub phase: JobPhase,
    pub phase_number: i64,
    pub phase_current: i64,
    pub phase_total: i64,
    pub total_phases: i64,
    pub files_processed: i64,
    pub estimated_total: i64,
    pub discovery_count: i64,
    /// Exponential moving average of per-file scan time, in seconds.
    pub average_scan_time: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_file: Option<String>,
    pub progress_message: Option<String>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub outcome: Option<JobOutcome>,
}

impl JobState {
    pub fn idle(kind: JobKind) -> Self {
        Self {
            kind,
            job_id: None,
            is_running: false,
            phase: JobPhase::Idle,
            phase_number: 0,
            phase_current: 0,
            phase_total: 0,
            total_phases: kind.total_phases(),
            files_processed: 0,
            estimated_total: 0,
            discovery_count: 0,
            average_scan_time: None,
            start_time: None,
            end_time: None,
            current_file: None,
            progress_message: None,
            error_message: None,
            cancel_requested: false,
            outcome: None,
        }
    }

    /// `average_scan_time × (estimated_total − files_processed)`.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let average = self.average_scan_time?;
        let remaining = (self.estimated_total - self.files_processed).max(0);
        Some(Duration::from_secs_f64(average.max(0.0) * remaining as f64))
    }

    /// Overall completion across phases, weighted per job kind, in `0..=100`.
    pub fn progress_percent(&self) -> f64 {
        if self.outcome == Some(JobOutcome::Completed) {
            return 100.0;
        }
        if self.phase_number <= 0 {
            return 0.0;
        }

        let weights = self.kind.phase_weights();
        let index = (self.phase_number - 1) as usize;
        let completed: f64 = weights.iter().take(index).sum();
        let current = weights.get(index).copied().unwrap_or_default();
        let within = if self.phase_total > 0 {
            self.phase_current as f64 / self.phase_total as f64
        } else {
            0.0
        };

        ((completed + current * within) * 100.0).clamp(0.0, 100.0)
    }
}
