//! In-memory broker for tests and single-process deployments.
//!
//! Each channel is an unbounded tokio `mpsc` queue whose receiver is shared
//! by every consumer of the channel, so consumers compete for messages.
//! Deliveries stay in an unacked table until settled. Closing the broker
//! requeues unacked messages, mirroring a broker that redelivers what a lost
//! connection never acknowledged.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tasklane_core::error::MessagingError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::broker::{Acker, Broker, ChannelOptions, Consumer, Delivery};

#[derive(Debug, Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    attempt: u32,
}

#[derive(Debug)]
struct Queue {
    name: String,
    options: ChannelOptions,
    sender: mpsc::UnboundedSender<QueuedMessage>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedMessage>>,
    ready: AtomicUsize,
    published: AtomicUsize,
    unacked: Mutex<HashMap<u64, QueuedMessage>>,
}

impl Queue {
    fn new(name: &str, options: ChannelOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_owned(),
            options,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            ready: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            unacked: Mutex::new(HashMap::new()),
        }
    }

    fn enqueue(&self, message: QueuedMessage) -> Result<(), MessagingError> {
        // Counted before the send so a consumer never observes it uncounted.
        self.ready.fetch_add(1, Ordering::SeqCst);
        self.sender.send(message).map_err(|_| {
            self.ready.fetch_sub(1, Ordering::SeqCst);
            MessagingError::ConnectionClosed
        })
    }
}

#[derive(Debug)]
struct BrokerState {
    channels: Mutex<HashMap<String, Arc<Queue>>>,
    next_tag: AtomicU64,
    closed: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, MessagingError> {
    mutex
        .lock()
        .map_err(|_| MessagingError::Transport("broker state lock poisoned".into()))
}

/// A broker living in process memory. Cloning shares the same channels.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates an open broker with no channels.
    #[must_use]
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            state: Arc::new(BrokerState {
                channels: Mutex::new(HashMap::new()),
                next_tag: AtomicU64::new(0),
                closed,
            }),
        }
    }

    /// Closes the connection. Every later call fails with
    /// `MessagingError::ConnectionClosed`, waiting consumers return `None`,
    /// and unacked messages go back to their channels.
    pub fn close(&self) {
        self.state.closed.send_replace(true);
        let Ok(channels) = lock(&self.state.channels) else {
            return;
        };
        for queue in channels.values() {
            let Ok(mut unacked) = lock(&queue.unacked) else {
                continue;
            };
            let mut returned: Vec<(u64, QueuedMessage)> = unacked.drain().collect();
            returned.sort_by_key(|(tag, _)| *tag);
            for (_, message) in returned {
                let _ = queue.enqueue(QueuedMessage {
                    attempt: message.attempt + 1,
                    ..message
                });
            }
        }
        debug!("in-memory broker closed");
    }

    /// Returns `true` once [`InMemoryBroker::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.state.closed.borrow()
    }

    /// Messages waiting in `channel` for a consumer.
    #[must_use]
    pub fn ready_count(&self, channel: &str) -> usize {
        self.queue(channel)
            .map_or(0, |queue| queue.ready.load(Ordering::SeqCst))
    }

    /// Messages delivered from `channel` and not yet settled.
    #[must_use]
    pub fn unacked_count(&self, channel: &str) -> usize {
        self.queue(channel)
            .ok()
            .and_then(|queue| lock(&queue.unacked).ok().map(|unacked| unacked.len()))
            .unwrap_or(0)
    }

    /// Messages ever published to `channel`, requeues excluded.
    #[must_use]
    pub fn published_count(&self, channel: &str) -> usize {
        self.queue(channel)
            .map_or(0, |queue| queue.published.load(Ordering::SeqCst))
    }

    /// Attributes `channel` was declared with, if declared.
    #[must_use]
    pub fn channel_options(&self, channel: &str) -> Option<ChannelOptions> {
        self.queue(channel).ok().map(|queue| queue.options)
    }

    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.is_closed() {
            return Err(MessagingError::ConnectionClosed);
        }
        Ok(())
    }

    fn queue(&self, channel: &str) -> Result<Arc<Queue>, MessagingError> {
        lock(&self.state.channels)?
            .get(channel)
            .cloned()
            .ok_or_else(|| MessagingError::ChannelNotFound(channel.to_owned()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_channel(
        &self,
        channel: &str,
        options: ChannelOptions,
    ) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let mut channels = lock(&self.state.channels)?;
        match channels.entry(channel.to_owned()) {
            Entry::Occupied(existing) => {
                if existing.get().options != options {
                    return Err(MessagingError::ChannelMismatch(channel.to_owned()));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Queue::new(channel, options)));
                debug!(channel, ?options, "channel declared");
            }
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        self.ensure_open()?;
        let queue = self.queue(channel)?;
        trace!(channel, bytes = payload.len(), "message published");
        queue.enqueue(QueuedMessage {
            payload,
            attempt: 1,
        })?;
        queue.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, channel: &str) -> Result<Box<dyn Consumer>, MessagingError> {
        self.ensure_open()?;
        let queue = self.queue(channel)?;
        let acker: Arc<dyn Acker> = Arc::new(QueueAcker {
            queue: Arc::clone(&queue),
            broker: self.clone(),
        });
        Ok(Box::new(InMemoryConsumer {
            queue,
            acker,
            state: Arc::clone(&self.state),
            closed: self.state.closed.subscribe(),
        }))
    }
}

#[derive(Debug)]
struct QueueAcker {
    queue: Arc<Queue>,
    broker: InMemoryBroker,
}

impl QueueAcker {
    fn unknown_tag(&self, delivery_tag: u64) -> MessagingError {
        MessagingError::Transport(format!(
            "unknown delivery tag {delivery_tag} on {}",
            self.queue.name
        ))
    }
}

#[async_trait]
impl Acker for QueueAcker {
    async fn ack(&self, delivery_tag: u64) -> Result<(), MessagingError> {
        self.broker.ensure_open()?;
        lock(&self.queue.unacked)?
            .remove(&delivery_tag)
            .ok_or_else(|| self.unknown_tag(delivery_tag))?;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), MessagingError> {
        self.broker.ensure_open()?;
        let mut unacked = lock(&self.queue.unacked)?;
        let message = unacked
            .get(&delivery_tag)
            .cloned()
            .ok_or_else(|| self.unknown_tag(delivery_tag))?;
        // Requeued before it leaves the unacked table.
        if requeue {
            self.queue.enqueue(QueuedMessage {
                attempt: message.attempt + 1,
                ..message
            })?;
        }
        unacked.remove(&delivery_tag);
        Ok(())
    }
}

struct InMemoryConsumer {
    queue: Arc<Queue>,
    acker: Arc<dyn Acker>,
    state: Arc<BrokerState>,
    closed: watch::Receiver<bool>,
}

/// Resolves once the broker is closed.
async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn next(&mut self) -> Option<Result<Delivery, MessagingError>> {
        let queue = Arc::clone(&self.queue);
        let message = tokio::select! {
            biased;
            () = closed_signal(&mut self.closed) => return None,
            message = async { queue.receiver.lock().await.recv().await } => message?,
        };

        let delivery_tag = self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let tracked = lock(&queue.unacked).map(|mut unacked| {
            unacked.insert(delivery_tag, message.clone());
        });
        queue.ready.fetch_sub(1, Ordering::SeqCst);
        if let Err(err) = tracked {
            return Some(Err(err));
        }

        Some(Ok(Delivery::new(
            delivery_tag,
            message.payload,
            message.attempt,
            Arc::clone(&self.acker),
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn declared(channel: &str) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker
            .declare_channel(channel, ChannelOptions::default())
            .await
            .unwrap();
        broker
    }

    async fn next_within(consumer: &mut Box<dyn Consumer>) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_millis(200), consumer.next())
            .await
            .ok()
            .flatten()
            .map(Result::unwrap)
    }

    #[tokio::test]
    async fn test_declare_is_idempotent_for_identical_options() {
        // Arrange
        let broker = declared("orders").await;

        // Act
        let result = broker
            .declare_channel("orders", ChannelOptions::default())
            .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(
            broker.channel_options("orders"),
            Some(ChannelOptions {
                durable: false,
                exclusive: false,
                auto_delete: false,
            })
        );
    }

    #[tokio::test]
    async fn test_redeclare_with_other_options_is_rejected() {
        let broker = declared("orders").await;

        let result = broker
            .declare_channel(
                "orders",
                ChannelOptions {
                    durable: true,
                    ..ChannelOptions::default()
                },
            )
            .await;

        assert_eq!(
            result,
            Err(MessagingError::ChannelMismatch("orders".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_channel_fails() {
        let broker = InMemoryBroker::new();

        let result = broker.publish("nowhere", b"{}".to_vec()).await;

        assert_eq!(
            result,
            Err(MessagingError::ChannelNotFound("nowhere".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_competing_consumers_each_message_delivered_once() {
        // Arrange
        let broker = declared("jobs").await;
        let mut first = broker.consume("jobs").await.unwrap();
        let mut second = broker.consume("jobs").await.unwrap();
        for n in 0..4u8 {
            broker.publish("jobs", vec![n]).await.unwrap();
        }

        // Act
        let mut payloads = Vec::new();
        for _ in 0..2 {
            payloads.push(next_within(&mut first).await.unwrap().payload);
            payloads.push(next_within(&mut second).await.unwrap().payload);
        }

        // Assert
        payloads.sort();
        assert_eq!(payloads, vec![vec![0], vec![1], vec![2], vec![3]]);
        assert!(next_within(&mut first).await.is_none());
        assert_eq!(broker.ready_count("jobs"), 0);
        assert_eq!(broker.unacked_count("jobs"), 4);
    }

    #[tokio::test]
    async fn test_nack_with_requeue_redelivers_with_next_attempt() {
        // Arrange
        let broker = declared("jobs").await;
        let mut consumer = broker.consume("jobs").await.unwrap();
        broker.publish("jobs", b"retry-me".to_vec()).await.unwrap();
        let first = next_within(&mut consumer).await.unwrap();
        assert_eq!(first.attempt, 1);

        // Act
        first.nack(true).await.unwrap();
        let second = next_within(&mut consumer).await.unwrap();

        // Assert
        assert_eq!(second.payload, b"retry-me".to_vec());
        assert_eq!(second.attempt, 2);
        second.ack().await.unwrap();
        assert_eq!(broker.unacked_count("jobs"), 0);
        assert_eq!(broker.ready_count("jobs"), 0);
        assert_eq!(broker.published_count("jobs"), 1);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_discards() {
        let broker = declared("jobs").await;
        let mut consumer = broker.consume("jobs").await.unwrap();
        broker.publish("jobs", b"drop-me".to_vec()).await.unwrap();

        next_within(&mut consumer).await.unwrap().nack(false).await.unwrap();

        assert!(next_within(&mut consumer).await.is_none());
        assert_eq!(broker.unacked_count("jobs"), 0);
    }

    #[tokio::test]
    async fn test_close_fails_calls_and_stops_waiting_consumers() {
        // Arrange
        let broker = declared("jobs").await;
        let mut consumer = broker.consume("jobs").await.unwrap();
        let waiting = tokio::spawn(async move { consumer.next().await.is_none() });

        // Act
        broker.close();

        // Assert
        assert!(waiting.await.unwrap());
        assert_eq!(
            broker.publish("jobs", b"{}".to_vec()).await,
            Err(MessagingError::ConnectionClosed)
        );
        assert!(matches!(
            broker.consume("jobs").await,
            Err(MessagingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_requeues_unacked_messages() {
        // Arrange
        let broker = declared("jobs").await;
        let mut consumer = broker.consume("jobs").await.unwrap();
        broker.publish("jobs", b"in-flight".to_vec()).await.unwrap();
        let delivery = next_within(&mut consumer).await.unwrap();

        // Act
        broker.close();

        // Assert
        assert_eq!(broker.ready_count("jobs"), 1);
        assert_eq!(broker.unacked_count("jobs"), 0);
        assert_eq!(delivery.ack().await, Err(MessagingError::ConnectionClosed));
    }
}
