//! Domain event to integration message translation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tasklane_core::error::{DomainError, MessagingError};
use tasklane_core::event::DomainEvent;
use tasklane_core::publisher::DomainEventHandler;
use tracing::debug;

use crate::gateway::MessagingGateway;
use crate::message::OutgoingMessage;

/// Maps a domain event to the integration messages that announce it.
///
/// Translation is pure: it encodes but never publishes. An event without an
/// integration counterpart translates to an empty list.
pub trait IntegrationTranslator<E: DomainEvent>: Send + Sync {
    /// Translates `event`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Serialization` if a message cannot be
    /// encoded.
    fn translate(&self, event: &E) -> Result<Vec<OutgoingMessage>, MessagingError>;
}

/// Local handler that publishes a translator's output through the gateway.
pub struct TranslatingHandler<T> {
    translator: Arc<T>,
    gateway: MessagingGateway,
}

impl<T> TranslatingHandler<T> {
    /// Publishes `translator`'s messages through `gateway`.
    #[must_use]
    pub fn new(translator: Arc<T>, gateway: MessagingGateway) -> Self {
        Self {
            translator,
            gateway,
        }
    }
}

impl<T> fmt::Debug for TranslatingHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatingHandler")
            .field("translator", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E, T> DomainEventHandler<E> for TranslatingHandler<T>
where
    E: DomainEvent,
    T: IntegrationTranslator<E>,
{
    async fn handle(&self, event: &E) -> Result<(), DomainError> {
        let messages = self.translator.translate(event)?;
        for message in messages {
            let channel = message.channel.clone();
            self.gateway.send(message).await?;
            debug!(
                channel,
                event_id = %event.metadata().event_id,
                "integration message published"
            );
        }
        Ok(())
    }
}
