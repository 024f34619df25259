//! Domain layer for the Todo context.

pub mod aggregates;
pub mod commands;
pub mod events;
