//! Tasklane Messaging: the cross-process half of the event relay.
//!
//! The [`MessagingGateway`](gateway::MessagingGateway) owns the broker
//! handle. Publishes are serialized through a single owner task; each
//! subscription runs competing consumer workers that resolve a fresh handler
//! per delivered message. Local translators turn domain events into
//! [`OutgoingMessage`](message::OutgoingMessage)s, and the outbox relay
//! publishes messages that were written in the same commit as the state
//! change that produced them.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod gateway;
pub mod in_memory;
pub mod message;
pub mod outbox;
pub mod translator;
