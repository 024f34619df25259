//! Wire encoding of integration events.
//!
//! The payload is the event serialized as a UTF-8 JSON object with no
//! envelope. The channel travels beside the payload, never inside it.

use tasklane_core::error::MessagingError;
use tasklane_core::integration::IntegrationEvent;

/// An encoded integration event addressed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Destination channel.
    pub channel: String,
    /// UTF-8 JSON body.
    pub payload: Vec<u8>,
}

impl OutgoingMessage {
    /// Encodes `event` for its default channel, `E::CHANNEL`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Serialization` if encoding fails.
    pub fn encode<E: IntegrationEvent>(event: &E) -> Result<Self, MessagingError> {
        Self::encode_to(event, E::CHANNEL)
    }

    /// Encodes `event` for an explicit channel.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Serialization` if encoding fails.
    pub fn encode_to<E: IntegrationEvent>(
        event: &E,
        channel: &str,
    ) -> Result<Self, MessagingError> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| MessagingError::Serialization(e.to_string()))?;
        Ok(Self {
            channel: channel.to_owned(),
            payload,
        })
    }
}

/// Decodes a payload into `E`.
///
/// # Errors
///
/// Returns `MessagingError::Decode` when the bytes are not UTF-8 JSON of the
/// expected shape.
pub fn decode<E: IntegrationEvent>(payload: &[u8]) -> Result<E, MessagingError> {
    let text = std::str::from_utf8(payload).map_err(|e| MessagingError::Decode(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| MessagingError::Decode(e.to_string()))
}
