//! Shared test doubles for Tasklane services.

mod broker;
mod clock;
mod handlers;

pub use broker::FailingBroker;
pub use clock::FixedClock;
pub use handlers::{FailingHandler, RecordingHandler};
