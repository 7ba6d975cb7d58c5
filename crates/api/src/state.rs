//! Application state shared across handlers.

use std::sync::Arc;
use telemetry::{HealthRegistry, Metrics};
use worker::{WorkerState, WorkerStatus};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Service name reported by `/health`
    pub service: String,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthRegistry>,
    /// State of the ingestion worker
    pub worker: Arc<WorkerStatus>,
}

impl AppState {
    pub fn new(
        service: impl Into<String>,
        metrics: Arc<Metrics>,
        health: Arc<HealthRegistry>,
        worker: Arc<WorkerStatus>,
    ) -> Self {
        Self {
            service: service.into(),
            metrics,
            health,
            worker,
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.get()
    }
}
