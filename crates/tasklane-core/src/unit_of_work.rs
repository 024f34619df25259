//! Unit of work and the commit interceptor.
//!
//! A unit of work persists every aggregate it tracks in one atomic write.
//! Only after that write succeeds does it hand its tracked aggregates to the
//! [`CommitInterceptor`], which drains their pending events and dispatches
//! them through the [`LocalPublisher`].
//!
//! Publication is not part of the atomic write. When a local handler fails
//! after the write, the committed state stays and the caller of `commit`
//! receives `DomainError::Dispatch`. Contexts that cannot accept this route
//! integration messages through an outbox written in the same commit.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::publisher::LocalPublisher;

/// A batch of aggregate mutations committed atomically.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Persists all tracked changes, then dispatches the domain events they
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` or `DomainError::Conflict` if the
    /// write failed (no event was dispatched), or `DomainError::Dispatch` if
    /// the write succeeded but a local handler failed.
    async fn commit(&mut self) -> Result<(), DomainError>;
}

/// Harvests pending domain events after a successful commit and dispatches
/// them locally.
pub struct CommitInterceptor<E> {
    publisher: Arc<LocalPublisher<E>>,
}

impl<E> Clone for CommitInterceptor<E> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<E> fmt::Debug for CommitInterceptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitInterceptor")
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl<E: DomainEvent> CommitInterceptor<E> {
    /// Creates an interceptor dispatching through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<LocalPublisher<E>>) -> Self {
        Self { publisher }
    }

    /// Drains every aggregate's pending events, in aggregate order and then
    /// per-aggregate insertion order. Aggregates with nothing pending are
    /// skipped.
    pub fn harvest<'a, A>(aggregates: impl IntoIterator<Item = &'a mut A>) -> Vec<E>
    where
        A: AggregateRoot<Event = E> + 'a,
    {
        let mut events = Vec::new();
        for aggregate in aggregates {
            if aggregate.pending_events().is_empty() {
                continue;
            }
            events.extend(aggregate.drain_pending_events());
        }
        events
    }

    /// Publishes `events` one at a time, awaiting each before the next.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error. Events before it have already been
    /// delivered; events after it are dropped.
    pub async fn dispatch(&self, events: Vec<E>) -> Result<usize, DomainError> {
        let total = events.len();
        debug!(events = total, "dispatching harvested domain events");

        for (index, event) in events.iter().enumerate() {
            if let Err(err) = self.publisher.publish(event).await {
                error!(
                    event_type = event.event_type(),
                    delivered = index,
                    dropped = total - index - 1,
                    error = %err,
                    "local dispatch failed after commit; committed state is kept"
                );
                return Err(err);
            }
        }
        Ok(total)
    }

    /// Harvests and dispatches in one step. Call only after the persistence
    /// write succeeded.
    ///
    /// # Errors
    ///
    /// See [`CommitInterceptor::dispatch`].
    pub async fn after_commit<'a, A>(
        &self,
        aggregates: impl IntoIterator<Item = &'a mut A>,
    ) -> Result<usize, DomainError>
    where
        A: AggregateRoot<Event = E> + 'a,
    {
        let events = Self::harvest(aggregates);
        self.dispatch(events).await
    }
}
