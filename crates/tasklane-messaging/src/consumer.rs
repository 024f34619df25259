//! Remote consumers.
//!
//! A subscription runs a fixed number of worker tasks competing for the
//! deliveries of one channel. Each delivered message is decoded and handed
//! to a handler resolved fresh from the subscription's factory, so every
//! message is processed in its own scope with its own unit of work.
//!
//! Under [`AckMode::AfterHandler`] a failed message is held for the
//! configured retry delay before it is requeued, so the delivery attempts
//! span [`MessagingConfig::retry_delay`] summed over the attempts rather
//! than a burst of immediate redeliveries.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tasklane_core::error::{DomainError, MessagingError};
use tasklane_core::integration::IntegrationEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::broker::{Consumer, Delivery};
use crate::config::{AckMode, MessagingConfig};
use crate::gateway::MessagingGateway;
use crate::message::{OutgoingMessage, decode};

/// Reacts to one integration event received from the broker.
#[async_trait]
pub trait IntegrationEventHandler<E: IntegrationEvent>: Send {
    /// Applies the event's effects and commits them.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateMessage` when the effects were already
    /// recorded (treated as success), or any other `DomainError` on failure.
    async fn handle(&mut self, event: E) -> Result<(), DomainError>;
}

/// Produces one handler per delivered message.
pub trait HandlerFactory<E: IntegrationEvent>: Send + Sync + 'static {
    /// The handler type this factory resolves.
    type Handler: IntegrationEventHandler<E>;

    /// Opens a new scope and resolves a handler bound to it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the scope's dependencies are unavailable.
    fn create_scope(&self) -> Result<Self::Handler, DomainError>;
}

impl<E, H, F> HandlerFactory<E> for F
where
    E: IntegrationEvent,
    H: IntegrationEventHandler<E>,
    F: Fn() -> Result<H, DomainError> + Send + Sync + 'static,
{
    type Handler = H;

    fn create_scope(&self) -> Result<H, DomainError> {
        self()
    }
}

/// Name of the channel that receives messages which exhausted their
/// delivery attempts on `channel`.
#[must_use]
pub fn dead_letter_channel(channel: &str) -> String {
    format!("{channel}.dead-letter")
}

/// Handle to a running subscription.
///
/// Dropping it signals the workers to stop after their current message.
#[derive(Debug)]
#[must_use = "dropping a subscription stops its workers"]
pub struct Subscription {
    channel: String,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// The consumed channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Number of competing workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops every worker once its in-flight message is settled and waits
    /// for them to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.send_replace(true);
        for worker in std::mem::take(&mut self.workers) {
            if let Err(err) = worker.await {
                warn!(channel = %self.channel, error = %err, "consumer worker ended abnormally");
            }
        }
        debug!(channel = %self.channel, "subscription stopped");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

pub(crate) fn spawn_workers<E, F>(
    channel: &str,
    consumers: Vec<Box<dyn Consumer>>,
    factory: Arc<F>,
    gateway: MessagingGateway,
) -> Subscription
where
    E: IntegrationEvent,
    F: HandlerFactory<E>,
{
    let (shutdown, _) = watch::channel(false);
    let settings = Arc::new(Settings {
        channel: channel.to_owned(),
        config: gateway.config().clone(),
    });

    let workers = consumers
        .into_iter()
        .enumerate()
        .map(|(index, consumer)| {
            let worker = Worker {
                index,
                settings: Arc::clone(&settings),
                factory: Arc::clone(&factory),
                gateway: gateway.clone(),
                _event: PhantomData::<fn() -> E>,
            };
            tokio::spawn(worker.run(consumer, shutdown.subscribe()))
        })
        .collect();

    Subscription {
        channel: channel.to_owned(),
        shutdown,
        workers,
    }
}

#[derive(Debug)]
struct Settings {
    channel: String,
    config: MessagingConfig,
}

struct Worker<E, F> {
    index: usize,
    settings: Arc<Settings>,
    factory: Arc<F>,
    gateway: MessagingGateway,
    _event: PhantomData<fn() -> E>,
}

impl<E, F> Worker<E, F>
where
    E: IntegrationEvent,
    F: HandlerFactory<E>,
{
    async fn run(self, mut consumer: Box<dyn Consumer>, mut shutdown: watch::Receiver<bool>) {
        let channel = self.settings.channel.as_str();
        loop {
            let delivery = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(err)) => {
                        warn!(channel, worker = self.index, error = %err, "receive failed");
                        continue;
                    }
                    None => {
                        debug!(channel, worker = self.index, "broker connection closed");
                        break;
                    }
                },
            };

            let span = info_span!(
                "remote_consumer",
                channel,
                worker = self.index,
                delivery_tag = delivery.delivery_tag,
                attempt = delivery.attempt
            );
            self.process(delivery, &shutdown).instrument(span).await;
        }
    }

    async fn process(&self, delivery: Delivery, shutdown: &watch::Receiver<bool>) {
        let event: E = match decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping message that does not decode");
                log_settle_failure(delivery.ack().await);
                return;
            }
        };

        match self.settings.config.ack_mode {
            AckMode::Immediate => {
                if let Err(err) = delivery.ack().await {
                    warn!(error = %err, "ack failed; skipping handler");
                    return;
                }
                if let Err(err) = self.invoke(event).await {
                    error!(
                        error = %err,
                        "handler failed; the message was acknowledged on receipt and is lost"
                    );
                }
            }
            AckMode::AfterHandler => self.handle_then_settle(delivery, event, shutdown).await,
        }
    }

    async fn handle_then_settle(
        &self,
        delivery: Delivery,
        event: E,
        shutdown: &watch::Receiver<bool>,
    ) {
        let dedup_key = event.dedup_key();
        match self.invoke(event).await {
            Ok(()) => log_settle_failure(delivery.ack().await),
            Err(DomainError::DuplicateMessage(key)) => {
                debug!(dedup_key = %key, "message already processed");
                log_settle_failure(delivery.ack().await);
            }
            Err(err) if delivery.attempt < self.settings.config.max_delivery_attempts => {
                let delay = self.settings.config.retry_delay(delivery.attempt);
                warn!(%dedup_key, error = %err, retry_in = ?delay, "handler failed; requeueing");
                let mut stop = shutdown.clone();
                tokio::select! {
                    _ = stop.changed() => {
                        debug!("shutting down; requeueing without delay");
                    }
                    () = tokio::time::sleep(delay) => {}
                }
                log_settle_failure(delivery.nack(true).await);
            }
            Err(err) => {
                let dead_letter = OutgoingMessage {
                    channel: dead_letter_channel(&self.settings.channel),
                    payload: delivery.payload.clone(),
                };
                error!(
                    %dedup_key,
                    error = %err,
                    dead_letter = %dead_letter.channel,
                    "delivery attempts exhausted; dead-lettering"
                );
                match self.gateway.send(dead_letter).await {
                    Ok(()) => log_settle_failure(delivery.ack().await),
                    Err(publish_err) => {
                        error!(error = %publish_err, "dead-letter publish failed; requeueing");
                        log_settle_failure(delivery.nack(true).await);
                    }
                }
            }
        }
    }

    async fn invoke(&self, event: E) -> Result<(), DomainError> {
        let mut handler = self.factory.create_scope()?;
        let after = self.settings.config.handler_timeout;
        tokio::time::timeout(after, handler.handle(event))
            .await
            .map_err(|_| {
                DomainError::Messaging(MessagingError::Timeout {
                    operation: "handle",
                    after,
                })
            })?
    }
}

fn log_settle_failure(result: Result<(), MessagingError>) {
    if let Err(err) = result {
        warn!(error = %err, "could not settle delivery");
    }
}
