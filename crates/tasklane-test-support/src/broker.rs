//! Test broker: a `Broker` whose connection is already gone.

use async_trait::async_trait;
use tasklane_core::error::MessagingError;
use tasklane_messaging::broker::{Broker, ChannelOptions, Consumer};

/// A broker that rejects every call with `MessagingError::ConnectionClosed`.
/// Useful for testing what a commit returns when publishing fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingBroker;

#[async_trait]
impl Broker for FailingBroker {
    async fn declare_channel(
        &self,
        _channel: &str,
        _options: ChannelOptions,
    ) -> Result<(), MessagingError> {
        Err(MessagingError::ConnectionClosed)
    }

    async fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<(), MessagingError> {
        Err(MessagingError::ConnectionClosed)
    }

    async fn consume(&self, _channel: &str) -> Result<Box<dyn Consumer>, MessagingError> {
        Err(MessagingError::ConnectionClosed)
    }
}
