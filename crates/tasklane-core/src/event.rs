//! Domain event abstractions.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::Clock;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Builds metadata for an event caused directly by a command.
    #[must_use]
    pub fn new(aggregate_id: Uuid, correlation_id: Uuid, clock: &dyn Clock) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            correlation_id,
            causation_id: correlation_id,
            occurred_at: clock.now(),
        }
    }
}

/// Trait that all domain events implement.
///
/// Domain events stay inside the process that produced them; anything that
/// must cross a service boundary is translated into an
/// [`IntegrationEvent`](crate::integration::IntegrationEvent) first.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name (used for local handler routing).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}
