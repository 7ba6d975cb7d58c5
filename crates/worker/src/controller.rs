//! Lifecycle controller for the ingestion worker.

use ingest_core::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer::{IngestionWorker, WorkerReport};
use crate::state::{WorkerState, WorkerStatus};

enum Slot {
    Running(JoinHandle<WorkerReport>),
    Finished(WorkerReport),
}

/// Starts the worker on its own task and stops it.
///
/// The controller is the only place that cancels the worker. `stop` and
/// `wait` may be called any number of times, concurrently; all callers get
/// the same report.
pub struct WorkerController {
    cancel: CancellationToken,
    status: Arc<WorkerStatus>,
    slot: Mutex<Slot>,
}

impl WorkerController {
    /// Subscribes and spawns the read loop.
    ///
    /// A subscribe failure is returned here and no task is spawned.
    pub async fn start(worker: IngestionWorker) -> Result<Self> {
        Self::start_with_token(worker, CancellationToken::new()).await
    }

    /// Like [`start`](Self::start), cancelling the worker when `cancel` fires.
    pub async fn start_with_token(
        worker: IngestionWorker,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let subscription = worker.subscribe().await?;
        let status = worker.status();

        let handle = tokio::spawn(worker.run(subscription, cancel.clone()));
        info!("Ingestion worker started");

        Ok(Self {
            cancel,
            status,
            slot: Mutex::new(Slot::Running(handle)),
        })
    }

    /// Signals cancellation and waits until the worker is closed.
    pub async fn stop(&self) -> WorkerReport {
        if !self.cancel.is_cancelled() {
            info!("Stopping ingestion worker");
            self.cancel.cancel();
        }
        self.wait().await
    }

    /// Waits for the worker to finish without cancelling it.
    pub async fn wait(&self) -> WorkerReport {
        let mut slot = self.slot.lock().await;

        let report = match &mut *slot {
            Slot::Finished(report) => return report.clone(),
            Slot::Running(handle) => match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "Ingestion worker task failed");
                    self.status.advance(WorkerState::Closed);
                    WorkerReport::panicked(e.to_string())
                }
            },
        };

        info!(
            reason = ?report.reason,
            messages_read = report.messages_read,
            tasks_abandoned = report.tasks_abandoned,
            "Ingestion worker stopped"
        );

        *slot = Slot::Finished(report.clone());
        report
    }

    pub fn state(&self) -> WorkerState {
        self.status.get()
    }

    pub fn status(&self) -> Arc<WorkerStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Closed
    }

    /// Token that cancels this worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
