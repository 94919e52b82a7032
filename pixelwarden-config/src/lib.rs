//! Configuration loading for Pixelwarden.
//!
//! Resolves engine and database settings from the environment, a config file
//! or inline JSON, and installs the process-wide tracing subscriber.
#![allow(missing_docs)]

pub mod scanner;
pub mod telemetry;

pub use scanner::{DatabaseSettings, ScannerConfig, ScannerConfigSource};
pub use telemetry::init_tracing;
