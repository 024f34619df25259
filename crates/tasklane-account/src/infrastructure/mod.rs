//! In-memory persistence and the unit of work for the Account context.

pub mod context;
pub mod database;
