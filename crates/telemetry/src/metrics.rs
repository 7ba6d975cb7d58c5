//! In-process metrics for the ingestion worker.
//!
//! A single [`Metrics`] instance is created at process start and shared
//! through `Arc` with the worker, its per-message tasks and the scrape
//! endpoint. Each instance owns its own Prometheus registry; nothing is
//! registered globally.

use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sighting events decoded and accounted for.
pub const EVENTS_PROCESSED: &str = "inventory_rfid_events_total";
/// Messages dropped because they did not decode.
pub const DECODE_FAILURES: &str = "inventory_rfid_decode_failures_total";
/// Messages read off the queue, whatever their outcome.
pub const MESSAGES_CONSUMED: &str = "inventory_rfid_messages_consumed_total";
/// Fetch failures that ended a read loop.
pub const FETCH_ERRORS: &str = "inventory_rfid_fetch_errors_total";
/// Per-message tasks currently running.
pub const TASKS_IN_FLIGHT: &str = "inventory_rfid_tasks_in_flight";

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
}

/// Collected metrics for the ingestion worker.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub events_processed: IntCounter,
    pub decode_failures: IntCounter,
    pub messages_consumed: IntCounter,
    pub fetch_errors: IntCounter,

    pub tasks_in_flight: IntGauge,
}

impl Metrics {
    /// Creates the metrics and registers them on a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        let metrics = Self {
            registry: Registry::new(),
            events_processed: counter(
                EVENTS_PROCESSED,
                "Total number of RFID events processed by the worker group",
            )?,
            decode_failures: counter(
                DECODE_FAILURES,
                "Total number of RFID messages dropped because they failed to decode",
            )?,
            messages_consumed: counter(
                MESSAGES_CONSUMED,
                "Total number of messages read from the sighting topic",
            )?,
            fetch_errors: counter(
                FETCH_ERRORS,
                "Total number of fetch errors that terminated the read loop",
            )?,
            tasks_in_flight: IntGauge::with_opts(Opts::new(
                TASKS_IN_FLIGHT,
                "Number of per-message tasks currently running",
            ))?,
        };

        for collector in [
            Box::new(metrics.events_processed.clone()) as Box<dyn Collector>,
            Box::new(metrics.decode_failures.clone()),
            Box::new(metrics.messages_consumed.clone()),
            Box::new(metrics.fetch_errors.clone()),
            Box::new(metrics.tasks_in_flight.clone()),
        ] {
            metrics.registry.register(collector)?;
        }

        Ok(metrics)
    }

    /// The registry backing this instance.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Looks up a counter by its exported name.
    pub fn counter(&self, name: &str) -> Option<&IntCounter> {
        self.counters()
            .into_iter()
            .find(|(counter_name, _)| *counter_name == name)
            .map(|(_, counter)| counter)
    }

    /// Increments the named counter. Returns false for an unknown name.
    pub fn increment(&self, name: &str) -> bool {
        match self.counter(name) {
            Some(counter) => {
                counter.inc();
                true
            }
            None => false,
        }
    }

    fn counters(&self) -> [(&'static str, &IntCounter); 4] {
        [
            (EVENTS_PROCESSED, &self.events_processed),
            (DECODE_FAILURES, &self.decode_failures),
            (MESSAGES_CONSUMED, &self.messages_consumed),
            (FETCH_ERRORS, &self.fetch_errors),
        ]
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            counters: self
                .counters()
                .into_iter()
                .map(|(name, counter)| (name.to_string(), counter.get()))
                .collect(),
            gauges: BTreeMap::from([(TASKS_IN_FLIGHT.to_string(), self.tasks_in_flight.get())]),
        }
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type matching [`render_prometheus`](Self::render_prometheus).
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
}

impl MetricsSnapshot {
    /// Value of a counter, zero if it is not known.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn events_processed(&self) -> u64 {
        self.counter(EVENTS_PROCESSED)
    }

    pub fn decode_failures(&self) -> u64 {
        self.counter(DECODE_FAILURES)
    }

    pub fn messages_consumed(&self) -> u64 {
        self.counter(MESSAGES_CONSUMED)
    }
}
