//! Domain and messaging error types.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The change conflicts with already persisted state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The persistence write failed; nothing was committed or dispatched.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A local handler failed after the commit succeeded. The committed
    /// state stays in place.
    #[error("dispatch of {event_type} failed: {source}")]
    Dispatch {
        /// The event type whose handler failed.
        event_type: &'static str,
        /// The handler's error.
        source: Box<DomainError>,
    },

    /// Publishing or consuming over the broker failed.
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    /// The message's effects were already recorded under this dedup key.
    #[error("message already processed: {0}")]
    DuplicateMessage(String),

    /// An infrastructure error outside persistence and messaging.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns the innermost error, looking through dispatch wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &DomainError {
        match self {
            DomainError::Dispatch { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised by the broker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// The broker connection is closed or the publish owner task is gone.
    #[error("broker connection is closed")]
    ConnectionClosed,

    /// The channel has not been declared.
    #[error("channel not declared: {0}")]
    ChannelNotFound(String),

    /// The channel exists with different attributes.
    #[error("channel {0} already declared with different options")]
    ChannelMismatch(String),

    /// The event could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The payload is not a UTF-8 JSON object of the expected shape.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// An operation did not complete within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that expired.
        operation: &'static str,
        /// The configured deadline.
        after: Duration,
    },

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}
