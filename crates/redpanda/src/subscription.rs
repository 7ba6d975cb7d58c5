//! Queue boundary used by the ingestion worker.
//!
//! The worker only sees these two traits, so tests can drive it with an
//! in-memory queue while production uses [`crate::RedpandaSubscriber`].

use async_trait::async_trait;
use ingest_core::{RawMessage, Result};
use tokio_util::sync::CancellationToken;

/// Opens subscriptions on a topic under a consumer group.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Opens a subscription. Any failure is reported as `Error::Subscribe`.
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn Subscription>>;
}

/// A live subscription, exclusively owned by one read loop.
#[async_trait]
pub trait Subscription: Send {
    /// Blocks until the next message arrives, the queue fails, or `cancel` fires.
    ///
    /// Returns `Error::Cancelled` when the token caused the return.
    async fn read_next(&mut self, cancel: &CancellationToken) -> Result<RawMessage>;

    /// Releases the underlying connection.
    async fn close(&mut self) -> Result<()>;
}
