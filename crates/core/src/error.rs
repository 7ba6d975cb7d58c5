//! Unified error types for the ingestion worker.
//!
//! Decode failures are per-message and never leave the task that hit them.
//! Everything else maps onto a worker lifecycle transition:
//! - `Subscribe`: startup failure, the worker never reaches `Reading`
//! - `Fetch` / `Cancelled`: the read loop ends and the worker drains
//! - `Close`: reported, but the worker still reaches `Closed`

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a raw payload could not become a [`crate::TagSighting`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid sighting: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl DecodeError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Malformed(_) => "malformed",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// Unified error type for the ingestion worker.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to subscribe to {topic} as {group_id}: {message}")]
    Subscribe {
        topic: String,
        group_id: String,
        message: String,
    },

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("fetch cancelled")]
    Cancelled,

    #[error("close error: {0}")]
    Close(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn subscribe(
        topic: impl Into<String>,
        group_id: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            group_id: group_id.into(),
            message: msg.into(),
        }
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn close(msg: impl Into<String>) -> Self {
        Self::Close(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the error was caused by the cancellation signal rather than the queue.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
