//! # Pixelwarden Core
//!
//! Engine that discovers media files, probes them with external tools, and
//! classifies the tool output into a healthy / warning / corrupted verdict.
//!
//! ## Overview
//!
//! - **Jobs**: scan and cleanup run as cancellable, multi-phase background
//!   jobs whose progress survives restarts ([`job`]).
//! - **Worker pool**: bounded-concurrency probing with claim tokens so a row
//!   is only ever written by the worker holding it ([`pool`]).
//! - **Classifier**: an ordered rule table over raw probe output that can be
//!   re-applied to stored results without re-probing ([`classify`]).
//! - **Result store**: SQLite persistence with optimistic concurrency
//!   ([`store`]), kept tuned by the [`maintenance`] coordinator.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pixelwarden_core::{
//!     CommandProbe, EngineConfig, FilesystemDiscovery, JobController, MediaFamily, ProbeRouter,
//!     ResultStore, ScanRequest, SqliteJobStateStore,
//! };
//!
//! async fn scan_library() -> pixelwarden_core::Result<()> {
//!     let config = EngineConfig::default();
//!     let store = ResultStore::connect("sqlite://pixelwarden.db", 8).await?;
//!     store.migrate().await?;
//!
//!     let router = ProbeRouter::new(config.media_extensions.clone())
//!         .with_probe(MediaFamily::Video, Arc::new(CommandProbe::ffmpeg()))
//!         .with_probe(MediaFamily::Image, Arc::new(CommandProbe::imagemagick()));
//!     let discovery = FilesystemDiscovery::from_config(&config);
//!
//!     let controller = JobController::new(
//!         store.clone(),
//!         Arc::new(SqliteJobStateStore::new(store.pool().clone())),
//!         Arc::new(discovery),
//!         Arc::new(router),
//!         config,
//!     )
//!     .await?;
//!
//!     let handle = controller
//!         .start_scan(ScanRequest::new(["/srv/media".into()]))
//!         .await?;
//!     let outcome = handle.wait().await?;
//!     println!("scan finished: {outcome}");
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Rule-based verdicts and retroactive reclassification
pub mod classify;

/// Engine tuning knobs
pub mod config;

/// Media file enumeration and content identity
pub mod discovery;

/// Error types
pub mod error;

/// Scan and cleanup jobs
pub mod job;

/// Durability and planner-statistics upkeep
pub mod maintenance;

/// Bounded-concurrency probe execution
pub mod pool;

/// External tool adapters
pub mod probe;

/// SQLite persistence
pub mod store;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use classify::{Classification, Classifier, ReclassifyReport, Reclassifier, VerdictChange};
pub use config::{EngineConfig, MediaExtensions, MediaFamily, OutputLimits};
pub use discovery::{DiscoveredFile, DiscoveryProvider, FilesystemDiscovery};
pub use error::{IntegrityError, Result};
pub use job::{JobController, JobHandle, JobTracker, Progress, ScanRequest};
pub use maintenance::MaintenanceCoordinator;
pub use pool::{BatchReport, WorkerPool};
pub use probe::{CommandProbe, MediaProbe, ProbeError, ProbeReport, ProbeRouter};
pub use store::{
    IgnoredErrorPattern, JobStateStore, MemoryJobStateStore, ResultQuery, ResultStore,
    ResultSummary, SqliteJobStateStore, VerdictFilter,
};
