//! Redpanda configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Connection settings shared by every client built from this config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9093".to_string()]
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            sasl_username: None,
            sasl_password: None,
            consumer: ConsumerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// SASL credentials, if both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    Latest,
}

/// Consumer configuration for the sighting topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Topic carrying tag sightings
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group id identifying this worker pool
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Partitions read by this worker; empty reads every partition of the topic
    #[serde(default)]
    pub partitions: Vec<i32>,
    #[serde(default = "default_start_offset")]
    pub start_offset: StartOffset,
    /// Minimum bytes the broker should accumulate before answering a fetch
    #[serde(default = "default_min_bytes")]
    pub min_bytes: i32,
    /// Upper bound on bytes returned by a single fetch
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i32,
    /// Long-poll wait per fetch in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    /// Fetched messages buffered ahead of the read loop across all partitions
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_topic() -> String {
    "rfid-pings".to_string()
}

fn default_group_id() -> String {
    "inventory-workers".to_string()
}

fn default_start_offset() -> StartOffset {
    StartOffset::Latest
}

fn default_min_bytes() -> i32 {
    10_000 // 10KB
}

fn default_max_bytes() -> i32 {
    10_000_000 // 10MB
}

fn default_max_wait_ms() -> i32 {
    500
}

fn default_buffer_capacity() -> usize {
    1024
}

impl ConsumerConfig {
    /// Byte range passed to each fetch. Always non-empty.
    pub fn fetch_bytes(&self) -> Range<i32> {
        let min = self.min_bytes.max(1);
        min..self.max_bytes.max(min + 1)
    }

    /// Picks the partitions to read out of those the topic has.
    ///
    /// An empty `partitions` list selects all of them. Returns the missing
    /// partition if one was configured that the topic does not have.
    pub fn select_partitions(
        &self,
        available: &BTreeSet<i32>,
    ) -> std::result::Result<Vec<i32>, i32> {
        if self.partitions.is_empty() {
            return Ok(available.iter().copied().collect());
        }

        let mut selected = BTreeSet::new();
        for partition in &self.partitions {
            if !available.contains(partition) {
                return Err(*partition);
            }
            selected.insert(*partition);
        }
        Ok(selected.into_iter().collect())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            group_id: default_group_id(),
            partitions: Vec::new(),
            start_offset: default_start_offset(),
            min_bytes: default_min_bytes(),
            max_bytes: default_max_bytes(),
            max_wait_ms: default_max_wait_ms(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}
