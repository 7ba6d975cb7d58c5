//! Ingestion worker: reads tag sightings off the queue and accounts for them.
//!
//! The pipeline per message:
//! 1. Read the next message (sequential, in partition order)
//! 2. Spawn a tracked task that decodes it and bumps the processed counter
//! 3. Go back to 1 without waiting for the task
//!
//! Processing order is unspecified. On cancellation or a fetch error the
//! loop stops, the subscription is closed, and in-flight tasks are joined
//! for at most `drain_timeout`.

use ingest_core::{DecodeError, Error, RawMessage, Result, TagSighting};
use redpanda::{Subscriber, Subscription};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{HealthRegistry, Metrics};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::state::{WorkerState, WorkerStatus};

/// Ingestion worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Ceiling on concurrently running per-message tasks; `None` is unbounded
    #[serde(default)]
    pub max_in_flight: Option<usize>,
    /// How long draining waits for in-flight tasks, in milliseconds
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Why the read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum StopReason {
    /// The controller cancelled the worker.
    Cancelled,
    /// The queue returned an error; the worker drained on its own.
    FetchFailed(String),
    /// The worker task panicked before reporting.
    Panicked(String),
}

/// Completion signal of a worker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub reason: StopReason,
    /// Messages read off the queue (decoded or not)
    pub messages_read: u64,
    /// Error returned by closing the subscription, if any
    pub close_error: Option<String>,
    /// Tasks still running when the drain timeout expired
    pub tasks_abandoned: usize,
}

impl WorkerReport {
    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self {
            reason: StopReason::Panicked(message.into()),
            messages_read: 0,
            close_error: None,
            tasks_abandoned: 0,
        }
    }

    /// True when the worker stopped because it was asked to and drained fully.
    pub fn is_clean(&self) -> bool {
        self.reason == StopReason::Cancelled
            && self.close_error.is_none()
            && self.tasks_abandoned == 0
    }
}

/// Decodes one message and records the outcome.
///
/// Decode failures are counted and logged, then dropped.
pub fn process_message(
    message: &RawMessage,
    metrics: &Metrics,
) -> std::result::Result<TagSighting, DecodeError> {
    match message.decode() {
        Ok(sighting) => {
            metrics.events_processed.inc();
            Ok(sighting)
        }
        Err(e) => {
            metrics.decode_failures.inc();
            warn!(
                partition = message.partition,
                offset = message.offset,
                kind = e.kind(),
                error = %e,
                "Dropping undecodable message"
            );
            Err(e)
        }
    }
}

/// Closes `tracker` and waits up to `timeout` for its tasks.
///
/// Returns the number of tasks still running when the wait gave up.
async fn join_tasks(tracker: &TaskTracker, timeout: Duration) -> usize {
    tracker.close();
    match tokio::time::timeout(timeout, tracker.wait()).await {
        Ok(()) => 0,
        Err(_) => {
            let remaining = tracker.len();
            warn!(
                remaining = remaining,
                timeout_ms = timeout.as_millis() as u64,
                "Drain timed out with tasks still running"
            );
            remaining
        }
    }
}

/// Keeps the in-flight gauge accurate even if a task unwinds.
struct InFlight(Arc<Metrics>);

impl InFlight {
    fn enter(metrics: Arc<Metrics>) -> Self {
        metrics.tasks_in_flight.inc();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.tasks_in_flight.dec();
    }
}

/// Worker that owns one subscription and fans messages out to tasks.
pub struct IngestionWorker {
    subscriber: Arc<dyn Subscriber>,
    topic: String,
    group_id: String,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
    health: Arc<HealthRegistry>,
    status: Arc<WorkerStatus>,
}

impl IngestionWorker {
    /// Creates a new ingestion worker.
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
        metrics: Arc<Metrics>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            subscriber,
            topic: topic.into(),
            group_id: group_id.into(),
            config: WorkerConfig::default(),
            metrics,
            health,
            status: Arc::new(WorkerStatus::new()),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.status.get()
    }

    /// Shared handle to this worker's state, valid after the worker moves into its task.
    pub fn status(&self) -> Arc<WorkerStatus> {
        self.status.clone()
    }

    /// Opens the subscription. A failure closes the worker.
    pub async fn subscribe(&self) -> Result<Box<dyn Subscription>> {
        self.status.advance(WorkerState::Subscribing);
        self.health.worker.set_unhealthy("subscribing");

        match self.subscriber.subscribe(&self.topic, &self.group_id).await {
            Ok(subscription) => {
                info!(
                    topic = %self.topic,
                    group_id = %self.group_id,
                    "Subscribed to sighting topic"
                );
                Ok(subscription)
            }
            Err(e) => {
                let e = match e {
                    e @ Error::Subscribe { .. } => e,
                    other => Error::subscribe(&self.topic, &self.group_id, other.to_string()),
                };
                error!(error = %e, "Subscription failed");
                self.status.advance(WorkerState::Closed);
                self.health.worker.set_unhealthy(e.to_string());
                Err(e)
            }
        }
    }

    /// Main run loop - read, dispatch, repeat; then drain and close.
    ///
    /// Always closes the subscription before returning.
    pub async fn run(
        self,
        mut subscription: Box<dyn Subscription>,
        cancel: CancellationToken,
    ) -> WorkerReport {
        self.health.worker.set_healthy();
        self.status.advance(WorkerState::Reading);
        info!(
            topic = %self.topic,
            group_id = %self.group_id,
            max_in_flight = ?self.config.max_in_flight,
            "Ingestion worker reading"
        );

        let tracker = TaskTracker::new();
        let limiter = self
            .config
            .max_in_flight
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut messages_read: u64 = 0;

        let reason = loop {
            let message = match subscription.read_next(&cancel).await {
                Ok(message) => message,
                Err(e) if e.is_cancelled() => {
                    info!("Read loop cancelled");
                    break StopReason::Cancelled;
                }
                Err(e) => {
                    self.metrics.fetch_errors.inc();
                    error!(error = %e, messages_read = messages_read, "Read loop terminated by fetch error");
                    break StopReason::FetchFailed(e.to_string());
                }
            };

            messages_read += 1;
            self.metrics.messages_consumed.inc();

            // Never closed, so acquiring only waits for a running task to finish.
            let permit = match &limiter {
                Some(limiter) => limiter.clone().acquire_owned().await.ok(),
                None => None,
            };

            let in_flight = InFlight::enter(self.metrics.clone());
            tracker.spawn(async move {
                let _permit = permit;
                if let Ok(sighting) = process_message(&message, &in_flight.0) {
                    trace!(
                        tag_id = %sighting.tag_id,
                        location = %sighting.location,
                        timestamp = %sighting.timestamp,
                        "Processed sighting"
                    );
                }
                drop(in_flight);
            });
        };

        self.drain(subscription, tracker, reason, messages_read).await
    }

    async fn drain(
        &self,
        mut subscription: Box<dyn Subscription>,
        tracker: TaskTracker,
        reason: StopReason,
        messages_read: u64,
    ) -> WorkerReport {
        self.status.advance(WorkerState::Draining);
        info!(
            reason = ?reason,
            messages_read = messages_read,
            in_flight = tracker.len(),
            "Ingestion worker draining"
        );

        let close_error = match subscription.close().await {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to close subscription");
                Some(e.to_string())
            }
        };

        let tasks_abandoned = join_tasks(&tracker, self.config.drain_timeout()).await;

        self.status.advance(WorkerState::Closed);
        match &reason {
            StopReason::FetchFailed(message) => self.health.worker.set_unhealthy(message.clone()),
            _ => self.health.worker.set_unhealthy("worker closed"),
        }

        debug!(tasks_abandoned = tasks_abandoned, "Ingestion worker closed");

        WorkerReport {
            reason,
            messages_read,
            close_error,
            tasks_abandoned,
        }
    }
}
