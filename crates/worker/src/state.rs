//! Worker lifecycle state.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where the ingestion worker is in its lifecycle.
///
/// Transitions only move forward:
/// `Idle → Subscribing → Reading → Draining → Closed`.
/// A failed subscribe goes straight from `Subscribing` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Subscribing = 1,
    Reading = 2,
    Draining = 3,
    Closed = 4,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Subscribing => "subscribing",
            Self::Reading => "reading",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Subscribing,
            2 => Self::Reading,
            3 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free view of a worker's state.
///
/// The worker writes it; the controller and the health endpoint read it.
#[derive(Debug)]
pub struct WorkerStatus(AtomicU8);

impl WorkerStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Idle as u8))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next`. Never moves backwards; returns false if the
    /// transition was ignored.
    pub fn advance(&self, next: WorkerState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok()
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}
