//! In-memory persistence and the unit of work for the Todo context.

pub mod context;
pub mod database;
