//! Test handlers: `DomainEventHandler` doubles for local publisher tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tasklane_core::error::DomainError;
use tasklane_core::event::DomainEvent;
use tasklane_core::publisher::DomainEventHandler;

/// A handler that records every event it receives. Clones share the same
/// record, so one clone can be registered while another is inspected.
#[derive(Debug)]
pub struct RecordingHandler<E> {
    seen: Arc<Mutex<Vec<E>>>,
}

impl<E> Clone for RecordingHandler<E> {
    fn clone(&self) -> Self {
        Self {
            seen: Arc::clone(&self.seen),
        }
    }
}

impl<E> Default for RecordingHandler<E> {
    fn default() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone> RecordingHandler<E> {
    /// Creates a handler with an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the received events, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<E> {
        self.seen.lock().unwrap().clone()
    }

    /// Returns how many events were received.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl<E: DomainEvent + Clone> DomainEventHandler<E> for RecordingHandler<E> {
    async fn handle(&self, event: &E) -> Result<(), DomainError> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A handler that always fails with an infrastructure error and counts its
/// invocations.
#[derive(Debug, Clone, Default)]
pub struct FailingHandler {
    calls: Arc<AtomicUsize>,
}

impl FailingHandler {
    /// Creates a handler that has not been called yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the handler ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: DomainEvent> DomainEventHandler<E> for FailingHandler {
    async fn handle(&self, _event: &E) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Infrastructure("handler unavailable".into()))
    }
}
