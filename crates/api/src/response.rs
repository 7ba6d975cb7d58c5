//! API response bodies.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub mode: String,
    pub worker_state: String,
    pub worker_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_message: Option<String>,
    pub redpanda_connected: bool,
    pub events_processed: u64,
}
