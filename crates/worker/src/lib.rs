//! Streaming ingestion worker for RFID sightings.
//!
//! - [`IngestionWorker`]: subscription read loop with tracked per-message tasks
//! - [`WorkerController`]: start, cancel and drain from the owning process

pub mod consumer;
pub mod controller;
pub mod state;

pub use consumer::*;
pub use controller::WorkerController;
pub use state::{WorkerState, WorkerStatus};
