//! Tasklane: Account bounded context.
//!
//! Responsible for user registration and login. Every committed
//! registration is announced to other services as a
//! `UserCreatedIntegration` message.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod service;
