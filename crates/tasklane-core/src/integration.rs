//! Integration event abstraction.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A cross-service message with a stable, independently versioned schema.
///
/// Implementors serialize to a flat JSON object whose field names are the
/// declared property names. The channel is a compile-time constant per event
/// kind; callers may still override it per publish or subscribe.
pub trait IntegrationEvent:
    Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static
{
    /// Default channel name for this event kind.
    const CHANNEL: &'static str;

    /// Key identifying the business fact this message carries. Consumers
    /// record it in the same commit as the message's effects so that a
    /// redelivered message is applied at most once.
    fn dedup_key(&self) -> String;
}
