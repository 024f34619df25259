//! Tasklane Contracts: integration events exchanged between services.
//!
//! These types are the only schema services share. They carry identifiers
//! and plain values, never aggregate types, and their serialized field names
//! are part of the wire format.

mod user_created;

pub use user_created::UserCreatedIntegration;
