//! Aggregate root abstraction and pending event capture.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Ordered, append-only buffer of domain events an aggregate has recorded but
/// not yet handed off for dispatch.
///
/// Aggregates hold this in a private field, so only their own
/// state-changing methods can record into it.
#[derive(Debug, Clone)]
pub struct PendingEvents<E> {
    events: Vec<E>,
}

impl<E> Default for PendingEvents<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> PendingEvents<E> {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&mut self, event: E) {
        self.events.push(event);
    }

    /// Returns the recorded events in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.events
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes every recorded event, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }
}

/// Trait for aggregate roots that record domain events as a side effect of
/// their own mutations.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate records.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the events recorded since the last harvest.
    fn pending_events(&self) -> &[Self::Event];

    /// Returns every pending event and empties the buffer.
    ///
    /// Only the commit interceptor calls this, once per successful commit.
    fn drain_pending_events(&mut self) -> Vec<Self::Event>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_preserves_insertion_order() {
        // Arrange
        let mut pending = PendingEvents::new();

        // Act
        pending.record("first");
        pending.record("second");
        pending.record("third");

        // Assert
        assert_eq!(pending.as_slice(), &["first", "second", "third"]);
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_drain_returns_everything_and_empties_buffer() {
        // Arrange
        let mut pending = PendingEvents::new();
        pending.record(1);
        pending.record(2);

        // Act
        let drained = pending.drain();

        // Assert
        assert_eq!(drained, vec![1, 2]);
        assert!(pending.is_empty());
        assert!(pending.drain().is_empty());
    }
}
