//! In-process publisher for domain events.
//!
//! Handlers are registered per event type name and invoked sequentially, in
//! registration order. The first failing handler stops delivery of that event
//! to the handlers after it; there is no retry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info_span, trace};

use crate::error::DomainError;
use crate::event::DomainEvent;

/// A handler invoked in-process for a domain event.
#[async_trait]
pub trait DomainEventHandler<E: DomainEvent>: Send + Sync {
    /// Reacts to the event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the reaction failed. The error aborts
    /// delivery to the remaining handlers of this event.
    async fn handle(&self, event: &E) -> Result<(), DomainError>;
}

type HandlerMap<E> = HashMap<&'static str, Vec<Arc<dyn DomainEventHandler<E>>>>;

/// Collects handler registrations before the publisher is shared.
pub struct LocalPublisherBuilder<E> {
    handlers: HandlerMap<E>,
}

impl<E: DomainEvent> LocalPublisherBuilder<E> {
    /// Registers `handler` for events whose `event_type()` equals `event_type`.
    #[must_use]
    pub fn register<H>(self, event_type: &'static str, handler: H) -> Self
    where
        H: DomainEventHandler<E> + 'static,
    {
        self.register_shared(event_type, Arc::new(handler))
    }

    /// Registers an already shared handler.
    #[must_use]
    pub fn register_shared(
        mut self,
        event_type: &'static str,
        handler: Arc<dyn DomainEventHandler<E>>,
    ) -> Self {
        self.handlers.entry(event_type).or_default().push(handler);
        self
    }

    /// Freezes the registrations.
    #[must_use]
    pub fn build(self) -> LocalPublisher<E> {
        LocalPublisher {
            handlers: self.handlers,
        }
    }
}

impl<E> fmt::Debug for LocalPublisherBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPublisherBuilder")
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Synchronous, ordered fan-out of domain events to in-process handlers.
pub struct LocalPublisher<E> {
    handlers: HandlerMap<E>,
}

impl<E: DomainEvent> LocalPublisher<E> {
    /// Starts a new set of registrations.
    #[must_use]
    pub fn builder() -> LocalPublisherBuilder<E> {
        LocalPublisherBuilder {
            handlers: HashMap::new(),
        }
    }

    /// A publisher with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Returns how many handlers are registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Delivers `event` to every handler registered for its type, in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Dispatch` wrapping the first handler error.
    /// Handlers after the failing one are not invoked.
    pub async fn publish(&self, event: &E) -> Result<(), DomainError> {
        let event_type = event.event_type();
        let Some(handlers) = self.handlers.get(event_type) else {
            trace!(event_type, "no local handlers registered");
            return Ok(());
        };

        for (position, handler) in handlers.iter().enumerate() {
            let span = info_span!(
                "local_handler",
                event_type,
                event_id = %event.metadata().event_id,
                position
            );
            handler
                .handle(event)
                .instrument(span)
                .await
                .map_err(|source| DomainError::Dispatch {
                    event_type,
                    source: Box::new(source),
                })?;
        }

        debug!(event_type, handlers = handlers.len(), "event delivered locally");
        Ok(())
    }
}

impl<E> fmt::Debug for LocalPublisher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(event_type, handlers)| (*event_type, handlers.len()))
            .collect();
        f.debug_struct("LocalPublisher")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::event::EventMetadata;

    #[derive(Debug, Clone)]
    struct Pinged {
        metadata: EventMetadata,
        kind: &'static str,
    }

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            self.kind
        }

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }
    }

    fn pinged(kind: &'static str) -> Pinged {
        Pinged {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                aggregate_id: Uuid::new_v4(),
                correlation_id: Uuid::new_v4(),
                causation_id: Uuid::new_v4(),
                occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            },
            kind,
        }
    }

    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl DomainEventHandler<Pinged> for Tagging {
        async fn handle(&self, _event: &Pinged) -> Result<(), DomainError> {
            self.log.lock().unwrap().push(self.tag);
            if self.fail {
                return Err(DomainError::Validation(format!("{} refused", self.tag)));
            }
            Ok(())
        }
    }

    fn tagging(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Tagging {
        Tagging {
            tag,
            log: Arc::clone(log),
            fail,
        }
    }

    #[tokio::test]
    async fn test_publish_invokes_handlers_in_registration_order() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let publisher = LocalPublisher::builder()
            .register("ping", tagging("a", &log, false))
            .register("ping", tagging("b", &log, false))
            .register("ping", tagging("c", &log, false))
            .build();

        // Act
        publisher.publish(&pinged("ping")).await.unwrap();

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_publish_routes_by_exact_event_type() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let publisher = LocalPublisher::builder()
            .register("ping", tagging("ping-handler", &log, false))
            .register("pong", tagging("pong-handler", &log, false))
            .build();

        // Act
        publisher.publish(&pinged("pong")).await.unwrap();

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["pong-handler"]);
        assert_eq!(publisher.handler_count("ping"), 1);
        assert_eq!(publisher.handler_count("unknown"), 0);
    }

    #[tokio::test]
    async fn test_publish_without_handlers_succeeds() {
        let publisher: LocalPublisher<Pinged> = LocalPublisher::empty();

        let result = publisher.publish(&pinged("ping")).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failing_handler_stops_delivery_to_later_handlers() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let publisher = LocalPublisher::builder()
            .register("ping", tagging("a", &log, false))
            .register("ping", tagging("b", &log, true))
            .register("ping", tagging("c", &log, false))
            .build();

        // Act
        let result = publisher.publish(&pinged("ping")).await;

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        match result.unwrap_err() {
            DomainError::Dispatch { event_type, source } => {
                assert_eq!(event_type, "ping");
                assert!(matches!(*source, DomainError::Validation(_)));
            }
            other => panic!("expected Dispatch, got {other:?}"),
        }
    }
}
