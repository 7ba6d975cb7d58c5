//! Telemetry for the RFID ingestion worker.
//!
//! Metrics and health are plain owned objects: the binary creates one of
//! each and hands `Arc`s to the worker and the HTTP layer.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
