use pixelwarden_model::{JobKind, JobPhase};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("a {0} job is already running")]
    AlreadyRunning(JobKind),

    #[error("no {0} job is running")]
    NotRunning(JobKind),

    #[error("stale progress update for {kind} job: phase {attempted} is behind phase {current}")]
    StaleUpdate {
        kind: JobKind,
        current: i64,
        attempted: i64,
    },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: JobPhase, to: JobPhase },

    #[error("scan result already claimed: {0}")]
    ClaimConflict(String),

    #[error("claim lost before the result could be written: {0}")]
    StaleClaim(String),

    #[error("reclassification rolled back: {applied} of {expected} rows matched their expected version")]
    ReclassifyPartialFailure { expected: usize, applied: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} job cancelled")]
    Cancelled(JobKind),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntegrityError {
    /// Store-level failures escalate a job to `failed`; everything else is
    /// handled per file or per request.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            IntegrityError::Database(_)
                | IntegrityError::Migration(_)
                | IntegrityError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IntegrityError>;
