//! Core data model definitions shared across Pixelwarden crates.
#![allow(missing_docs)]

pub mod error;
pub mod job;
pub mod scan;

pub use error::{ModelError, Result as ModelResult};
pub use job::{JobKind, JobOutcome, JobPhase, JobState};
pub use scan::{
    ContentIdentity, ScanResult, ScanStatus, Verdict, VerdictColumns,
    VerdictKind,
};
