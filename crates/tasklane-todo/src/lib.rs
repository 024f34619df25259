//! Tasklane: Todo bounded context.
//!
//! Responsible for todo lists and their items. Provisions a default list for
//! every user announced by the Account service.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod service;
