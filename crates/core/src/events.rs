//! Tag sighting events and their wire decoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::DecodeError;

/// Maximum length of a tag identifier.
pub const MAX_TAG_ID_LEN: u64 = 256;

/// Maximum length of a location label.
pub const MAX_LOCATION_LEN: u64 = 512;

/// A single RFID tag sighting as produced by a reader.
///
/// Wire format is a JSON object:
///
/// ```json
/// {"tag_id": "TAG-X-42", "location": "Dubai-Hub", "timestamp": "2024-05-01T10:00:00Z"}
/// ```
///
/// Unknown keys are ignored. The timestamp is assigned by the producer and
/// may carry any UTC offset; it is normalised to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TagSighting {
    #[validate(length(min = 1, max = MAX_TAG_ID_LEN))]
    pub tag_id: String,
    #[validate(length(max = MAX_LOCATION_LEN))]
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// A message as handed over by the queue client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(partition: i32, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            offset,
            payload: payload.into(),
        }
    }

    /// Decodes the payload of this message.
    pub fn decode(&self) -> Result<TagSighting, DecodeError> {
        decode(&self.payload)
    }
}

/// Decodes a raw payload into a validated [`TagSighting`].
///
/// Either returns a fully populated record or an error; never a partial one.
pub fn decode(payload: &[u8]) -> Result<TagSighting, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let sighting: TagSighting = serde_json::from_slice(payload)?;
    sighting.validate()?;

    Ok(sighting)
}
