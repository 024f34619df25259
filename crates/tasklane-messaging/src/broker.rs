//! Broker abstraction.
//!
//! A broker stores messages in named channels. Consumers of one channel
//! compete: each message is delivered to one of them, and stays unacked until
//! the consumer acknowledges or rejects it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tasklane_core::error::MessagingError;

/// Channel attributes used when declaring a channel.
///
/// The gateway always declares with [`ChannelOptions::default`]: not durable,
/// not exclusive, no auto-delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Restricted to the declaring connection.
    pub exclusive: bool,
    /// Removed when the last consumer goes away.
    pub auto_delete: bool,
}

/// Settles deliveries with the broker that produced them.
#[async_trait]
pub trait Acker: Send + Sync + fmt::Debug {
    /// Acknowledges the delivery; the broker forgets the message.
    async fn ack(&self, delivery_tag: u64) -> Result<(), MessagingError>;

    /// Rejects the delivery. With `requeue` the message becomes available
    /// again; without, it is discarded.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), MessagingError>;
}

/// A message handed to one consumer.
#[derive(Debug)]
pub struct Delivery {
    /// Broker-assigned tag identifying this delivery.
    pub delivery_tag: u64,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// 1 for the first delivery, incremented on every requeue.
    pub attempt: u32,
    acker: Arc<dyn Acker>,
}

impl Delivery {
    /// Creates a delivery settled through `acker`.
    #[must_use]
    pub fn new(delivery_tag: u64, payload: Vec<u8>, attempt: u32, acker: Arc<dyn Acker>) -> Self {
        Self {
            delivery_tag,
            payload,
            attempt,
            acker,
        }
    }

    /// Acknowledges this delivery.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the broker connection is gone.
    pub async fn ack(self) -> Result<(), MessagingError> {
        self.acker.ack(self.delivery_tag).await
    }

    /// Rejects this delivery, optionally requeueing it.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the broker connection is gone.
    pub async fn nack(self, requeue: bool) -> Result<(), MessagingError> {
        self.acker.nack(self.delivery_tag, requeue).await
    }
}

/// A stream of deliveries from one channel.
#[async_trait]
pub trait Consumer: Send {
    /// Waits for the next delivery. Returns `None` once the connection is
    /// closed.
    async fn next(&mut self) -> Option<Result<Delivery, MessagingError>>;
}

/// The broker connection.
#[async_trait]
pub trait Broker: Send + Sync + fmt::Debug {
    /// Declares `channel`. Declaring an existing channel with the same
    /// options is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::ChannelMismatch` if the channel exists with
    /// other options, or `MessagingError::ConnectionClosed`.
    async fn declare_channel(
        &self,
        channel: &str,
        options: ChannelOptions,
    ) -> Result<(), MessagingError>;

    /// Appends `payload` to `channel`. No message properties are attached.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::ChannelNotFound` for an undeclared channel,
    /// or `MessagingError::ConnectionClosed`.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError>;

    /// Starts a consumer on `channel`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::ChannelNotFound` for an undeclared channel,
    /// or `MessagingError::ConnectionClosed`.
    async fn consume(&self, channel: &str) -> Result<Box<dyn Consumer>, MessagingError>;
}
