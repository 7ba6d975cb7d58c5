//! Redpanda health checks.

use crate::config::RedpandaConfig;
use crate::consumer::connect;
use tracing::{debug, error};

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to connect to Redpanda: {}", e);
            false
        }
    }
}

/// Returns true if the consumer topic exists on the cluster.
pub async fn topic_exists(config: &RedpandaConfig) -> bool {
    let Ok(client) = connect(config).await else {
        return false;
    };

    match client.list_topics().await {
        Ok(topics) => topics.iter().any(|t| t.name == config.consumer.topic),
        Err(_) => false,
    }
}
