//! Transactional outbox and its relay.
//!
//! A unit of work that writes integration messages into an outbox as part of
//! its own atomic commit can never persist a state change without the
//! message that announces it. The [`OutboxRelay`] then publishes pending
//! rows through the gateway and marks each one published only after the
//! broker confirmed it. A crash between publish and mark leads to a second
//! publish of the same row, which consumers absorb through their dedup keys.
//!
//! A failed publish leaves the row pending and schedules its next attempt
//! with the gateway's doubling retry delay, so a broker outage only delays
//! rows. Rows are only given up on when the relay was built with
//! [`OutboxRelay::with_max_attempts`], and [`OutboxRelay::replay_failed`]
//! puts those back in line.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::gateway::MessagingGateway;
use crate::message::OutgoingMessage;

/// Lifecycle of an outbox row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutboxStatus {
    /// Waiting to be published.
    #[default]
    Pending,
    /// Confirmed by the broker.
    Published,
    /// Gave up after the relay's attempt limit. Replayable.
    Failed,
}

/// One integration message waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    /// Row identifier, time-ordered.
    pub id: Uuid,
    /// Destination channel.
    pub channel: String,
    /// Encoded payload.
    pub payload: Vec<u8>,
    /// Current status.
    pub status: OutboxStatus,
    /// Failed publish attempts so far.
    pub attempts: u32,
    /// Earliest time the relay may try again; `None` means now.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
    /// When the broker confirmed the publish.
    pub published_at: Option<DateTime<Utc>>,
    /// The most recent publish error.
    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// Creates a pending row for `message`.
    #[must_use]
    pub fn pending(message: OutgoingMessage, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            channel: message.channel,
            payload: message.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            next_attempt_at: None,
            created_at,
            published_at: None,
            last_error: None,
        }
    }

    /// Returns `true` while the row still waits for the relay.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    /// Returns `true` if the row is pending and its backoff has elapsed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    /// The message to hand to the gateway.
    #[must_use]
    pub fn to_outgoing(&self) -> OutgoingMessage {
        OutgoingMessage {
            channel: self.channel.clone(),
            payload: self.payload.clone(),
        }
    }

    fn complete(&mut self, at: DateTime<Utc>) {
        self.status = OutboxStatus::Published;
        self.published_at = Some(at);
        self.next_attempt_at = None;
        self.last_error = None;
    }

    fn record_failure(
        &mut self,
        error: String,
        next_attempt_at: DateTime<Utc>,
        max_attempts: Option<u32>,
    ) {
        self.attempts += 1;
        self.last_error = Some(error);
        self.next_attempt_at = Some(next_attempt_at);
        if max_attempts.is_some_and(|max| self.attempts >= max) {
            self.status = OutboxStatus::Failed;
        }
    }

    fn requeue(&mut self) {
        self.status = OutboxStatus::Pending;
        self.attempts = 0;
        self.next_attempt_at = None;
    }
}

/// Storage the relay reads pending rows from and writes outcomes back to.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` rows that are due at `now` (see
    /// [`OutboxMessage::is_due`]), oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store cannot be read.
    async fn pending_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, DomainError>;

    /// Up to `limit` rows marked `Failed`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store cannot be read.
    async fn failed_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>, DomainError>;

    /// Overwrites the stored row with the same id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the row cannot be written.
    async fn save_message(&self, message: &OutboxMessage) -> Result<(), DomainError>;
}

/// Outcome of one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    /// Rows confirmed by the broker.
    pub published: usize,
    /// Rows that failed and stay pending for another pass.
    pub released: usize,
    /// Rows that failed for the last time.
    pub failed: usize,
}

impl DrainResult {
    /// Rows touched in this pass.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.published + self.released + self.failed
    }
}

/// Publishes pending outbox rows through the gateway.
pub struct OutboxRelay<S> {
    store: Arc<S>,
    gateway: MessagingGateway,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    max_attempts: Option<u32>,
}

impl<S> fmt::Debug for OutboxRelay<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("batch_size", &self.batch_size)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<S: OutboxStore + 'static> OutboxRelay<S> {
    /// Creates a relay with a batch size of 50 that keeps retrying a row
    /// until the broker confirms it.
    #[must_use]
    pub fn new(store: Arc<S>, gateway: MessagingGateway, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gateway,
            clock,
            batch_size: 50,
            max_attempts: None,
        }
    }

    /// Sets the maximum rows published per pass.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Marks a row failed after `max_attempts` failed publishes instead of
    /// retrying it forever.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Publishes one batch of due rows, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store fails. Publish errors
    /// are recorded on the row, not returned.
    pub async fn drain_once(&self) -> Result<DrainResult, DomainError> {
        let mut result = DrainResult::default();
        let now = self.clock.now();
        for mut message in self.store.pending_messages(now, self.batch_size).await? {
            match self.gateway.send(message.to_outgoing()).await {
                Ok(()) => {
                    message.complete(self.clock.now());
                    result.published += 1;
                }
                Err(err) => {
                    let delay = self.gateway.config().retry_delay(message.attempts + 1);
                    let next_attempt_at = TimeDelta::from_std(delay)
                        .ok()
                        .and_then(|delay| now.checked_add_signed(delay))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    message.record_failure(err.to_string(), next_attempt_at, self.max_attempts);
                    if message.is_pending() {
                        warn!(
                            outbox_id = %message.id,
                            channel = %message.channel,
                            attempts = message.attempts,
                            retry_in = ?delay,
                            error = %err,
                            "outbox publish failed; will retry"
                        );
                        result.released += 1;
                    } else {
                        error!(
                            outbox_id = %message.id,
                            channel = %message.channel,
                            attempts = message.attempts,
                            error = %err,
                            "outbox publish failed permanently"
                        );
                        result.failed += 1;
                    }
                }
            }
            self.store.save_message(&message).await?;
        }

        if result.processed() > 0 {
            debug!(
                published = result.published,
                released = result.released,
                failed = result.failed,
                "outbox pass finished"
            );
        }
        Ok(result)
    }

    /// Puts up to one batch of `Failed` rows back in line with a fresh
    /// attempt count, returning how many were requeued.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store fails.
    pub async fn replay_failed(&self) -> Result<usize, DomainError> {
        let failed = self.store.failed_messages(self.batch_size).await?;
        for mut message in failed.iter().cloned() {
            message.requeue();
            self.store.save_message(&message).await?;
        }
        if !failed.is_empty() {
            info!(replayed = failed.len(), "failed outbox rows requeued");
        }
        Ok(failed.len())
    }

    /// Runs [`OutboxRelay::drain_once`] in a background task, sleeping
    /// `poll_interval` between passes that found nothing to publish.
    #[must_use]
    pub fn spawn(self, poll_interval: Duration) -> RelayHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(?poll_interval, "outbox relay started");
            loop {
                let idle = match self.drain_once().await {
                    Ok(result) => result.published == 0,
                    Err(err) => {
                        error!(error = %err, "outbox pass failed");
                        true
                    }
                };
                if !idle && !*stop.borrow() {
                    continue;
                }
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    () = tokio::time::sleep(poll_interval) => {}
                }
            }
            info!("outbox relay stopped");
        });
        RelayHandle { shutdown, task }
    }
}

/// Handle to a relay started with [`OutboxRelay::spawn`].
#[derive(Debug)]
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Stops the relay after its current pass and waits for it.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "outbox relay ended abnormally");
        }
    }
}
