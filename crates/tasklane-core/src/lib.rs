//! Tasklane Core: shared domain abstractions and the in-process half of the
//! event relay.
//!
//! Every bounded context depends on this crate. It defines how aggregates
//! capture domain events, how a unit of work hands them to the local
//! publisher after a successful commit, and the error taxonomy shared by the
//! messaging layer. It contains no transport code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod integration;
pub mod publisher;
pub mod unit_of_work;
