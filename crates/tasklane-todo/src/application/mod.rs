//! Application layer for the Todo context.

pub mod command_handlers;
pub mod event_handlers;
pub mod query_handlers;
