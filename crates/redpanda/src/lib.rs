//! Redpanda subscription for the RFID ingestion worker.

pub mod config;
pub mod consumer;
pub mod health;
pub mod subscription;

pub use config::*;
pub use consumer::{RedpandaSubscriber, RedpandaSubscription};
pub use subscription::*;
