//! Messaging gateway: the single owner of the broker connection.
//!
//! Publishes from any task are funnelled through one owner task over an
//! `mpsc` queue; each request carries a `oneshot` for the broker's answer.
//! The caller waits at most `publish_timeout` for that answer. A publish that
//! times out may still reach the broker later, once the owner task gets to it.

use std::fmt;
use std::sync::Arc;

use tasklane_core::error::MessagingError;
use tasklane_core::integration::IntegrationEvent;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::broker::{Broker, ChannelOptions};
use crate::config::MessagingConfig;
use crate::consumer::{self, HandlerFactory, Subscription};
use crate::message::OutgoingMessage;

struct PublishRequest {
    message: OutgoingMessage,
    reply: oneshot::Sender<Result<(), MessagingError>>,
}

/// Publish and subscribe facade over a [`Broker`].
///
/// Cloning is cheap; all clones share the broker and the owner task. The
/// owner task stops when the last clone is dropped.
#[derive(Clone)]
pub struct MessagingGateway {
    broker: Arc<dyn Broker>,
    config: Arc<MessagingConfig>,
    requests: mpsc::Sender<PublishRequest>,
}

impl fmt::Debug for MessagingGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingGateway")
            .field("broker", &self.broker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MessagingGateway {
    /// Spawns the publish owner task and returns a gateway bound to it.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(broker: Arc<dyn Broker>, config: MessagingConfig) -> Self {
        let (requests, receiver) = mpsc::channel(config.publish_queue_capacity.max(1));
        tokio::spawn(run_publisher(Arc::clone(&broker), receiver));
        Self {
            broker,
            config: Arc::new(config),
            requests,
        }
    }

    /// The configuration this gateway was started with.
    #[must_use]
    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Publishes `event` to its default channel, `E::CHANNEL`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Serialization` if the event cannot be
    /// encoded, `MessagingError::Timeout` if the broker did not answer within
    /// `publish_timeout`, or the broker's own error.
    pub async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<(), MessagingError> {
        self.send(OutgoingMessage::encode(event)?).await
    }

    /// Publishes `event` to `channel` instead of its default channel.
    ///
    /// # Errors
    ///
    /// See [`MessagingGateway::publish`].
    pub async fn publish_to<E: IntegrationEvent>(
        &self,
        event: &E,
        channel: &str,
    ) -> Result<(), MessagingError> {
        self.send(OutgoingMessage::encode_to(event, channel)?).await
    }

    /// Hands an already encoded message to the owner task and waits for the
    /// broker's answer.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::ConnectionClosed` if the owner task is gone,
    /// `MessagingError::Timeout` on expiry, or the broker's own error.
    #[instrument(
        skip(self, message),
        fields(channel = %message.channel, bytes = message.payload.len())
    )]
    pub async fn send(&self, message: OutgoingMessage) -> Result<(), MessagingError> {
        let after = self.config.publish_timeout;
        let (reply, response) = oneshot::channel();
        let exchange = async {
            self.requests
                .send(PublishRequest { message, reply })
                .await
                .map_err(|_| MessagingError::ConnectionClosed)?;
            response.await.map_err(|_| MessagingError::ConnectionClosed)?
        };

        match tokio::time::timeout(after, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?after, "publish timed out");
                Err(MessagingError::Timeout {
                    operation: "publish",
                    after,
                })
            }
        }
    }

    /// Subscribes to `E::CHANNEL`. See [`MessagingGateway::subscribe_to`].
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the channel cannot be declared or
    /// consumed.
    pub async fn subscribe<E, F>(&self, factory: F) -> Result<Subscription, MessagingError>
    where
        E: IntegrationEvent,
        F: HandlerFactory<E>,
    {
        self.subscribe_to(factory, E::CHANNEL).await
    }

    /// Declares `channel` and starts `consumer_concurrency` competing workers
    /// on it. Every delivered message gets a fresh handler from `factory`.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the channel cannot be declared or
    /// consumed.
    pub async fn subscribe_to<E, F>(
        &self,
        factory: F,
        channel: &str,
    ) -> Result<Subscription, MessagingError>
    where
        E: IntegrationEvent,
        F: HandlerFactory<E>,
    {
        self.broker
            .declare_channel(channel, ChannelOptions::default())
            .await?;

        let mut consumers = Vec::with_capacity(self.config.consumer_concurrency);
        for _ in 0..self.config.consumer_concurrency.max(1) {
            consumers.push(self.broker.consume(channel).await?);
        }

        debug!(channel, workers = consumers.len(), "subscription started");
        Ok(consumer::spawn_workers(
            channel,
            consumers,
            Arc::new(factory),
            self.clone(),
        ))
    }
}

async fn run_publisher(broker: Arc<dyn Broker>, mut requests: mpsc::Receiver<PublishRequest>) {
    while let Some(PublishRequest { message, reply }) = requests.recv().await {
        let result = async {
            broker
                .declare_channel(&message.channel, ChannelOptions::default())
                .await?;
            broker.publish(&message.channel, message.payload).await
        }
        .await;

        if reply.send(result).is_err() {
            debug!("publish caller stopped waiting before the broker answered");
        }
    }
    debug!("publish owner task stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::broker::Consumer;
    use crate::in_memory::InMemoryBroker;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct ShipmentDispatched {
        order_id: u32,
    }

    impl IntegrationEvent for ShipmentDispatched {
        const CHANNEL: &'static str = "ShipmentDispatched";

        fn dedup_key(&self) -> String {
            format!("{}:{}", Self::CHANNEL, self.order_id)
        }
    }

    /// Delays every publish, standing in for an unresponsive broker.
    #[derive(Debug)]
    struct StalledBroker {
        inner: InMemoryBroker,
        delay: Duration,
    }

    #[async_trait]
    impl Broker for StalledBroker {
        async fn declare_channel(
            &self,
            channel: &str,
            options: ChannelOptions,
        ) -> Result<(), MessagingError> {
            self.inner.declare_channel(channel, options).await
        }

        async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
            tokio::time::sleep(self.delay).await;
            self.inner.publish(channel, payload).await
        }

        async fn consume(&self, channel: &str) -> Result<Box<dyn Consumer>, MessagingError> {
            self.inner.consume(channel).await
        }
    }

    #[tokio::test]
    async fn test_publish_declares_default_channel_with_fixed_options() {
        // Arrange
        let broker = InMemoryBroker::new();
        let gateway = MessagingGateway::start(Arc::new(broker.clone()), MessagingConfig::default());

        // Act
        gateway
            .publish(&ShipmentDispatched { order_id: 7 })
            .await
            .unwrap();

        // Assert
        assert_eq!(broker.published_count("ShipmentDispatched"), 1);
        assert_eq!(broker.ready_count("ShipmentDispatched"), 1);
        assert_eq!(
            broker.channel_options("ShipmentDispatched"),
            Some(ChannelOptions::default())
        );
    }

    #[tokio::test]
    async fn test_publish_to_overrides_channel() {
        let broker = InMemoryBroker::new();
        let gateway = MessagingGateway::start(Arc::new(broker.clone()), MessagingConfig::default());

        gateway
            .publish_to(&ShipmentDispatched { order_id: 7 }, "audit")
            .await
            .unwrap();

        assert_eq!(broker.published_count("audit"), 1);
        assert_eq!(broker.published_count("ShipmentDispatched"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_publishes_are_all_delivered() {
        // Arrange
        let broker = InMemoryBroker::new();
        let gateway = MessagingGateway::start(Arc::new(broker.clone()), MessagingConfig::default());

        // Act
        let mut tasks = Vec::new();
        for order_id in 0..20 {
            let gateway = gateway.clone();
            tasks.push(tokio::spawn(async move {
                gateway.publish(&ShipmentDispatched { order_id }).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Assert
        assert_eq!(broker.published_count("ShipmentDispatched"), 20);
    }

    #[tokio::test]
    async fn test_publish_on_closed_broker_returns_connection_closed() {
        let broker = InMemoryBroker::new();
        let gateway = MessagingGateway::start(Arc::new(broker.clone()), MessagingConfig::default());
        broker.close();

        let result = gateway.publish(&ShipmentDispatched { order_id: 1 }).await;

        assert_eq!(result, Err(MessagingError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_publish_times_out_when_broker_does_not_answer() {
        // Arrange
        let broker = StalledBroker {
            inner: InMemoryBroker::new(),
            delay: Duration::from_secs(5),
        };
        let config = MessagingConfig {
            publish_timeout: Duration::from_millis(50),
            ..MessagingConfig::default()
        };
        let gateway = MessagingGateway::start(Arc::new(broker), config);

        // Act
        let result = gateway.publish(&ShipmentDispatched { order_id: 3 }).await;

        // Assert
        assert_eq!(
            result,
            Err(MessagingError::Timeout {
                operation: "publish",
                after: Duration::from_millis(50),
            })
        );
    }
}
