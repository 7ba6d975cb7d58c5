//! Core types for the RFID ingestion worker.
//!
//! Holds the tag sighting record, its wire decoder, and the error
//! taxonomy shared by the queue, worker and API crates.

pub mod error;
pub mod events;

pub use error::{DecodeError, Error, Result};
pub use events::*;
