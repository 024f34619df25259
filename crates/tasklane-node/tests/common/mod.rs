//! Shared helpers for node integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tasklane_account::domain::commands::RegisterUser;
use tasklane_core::clock::Clock;
use tasklane_messaging::config::MessagingConfig;
use tasklane_test_support::FixedClock;
use uuid::Uuid;

/// Fixed timestamp used across all node tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::morning())
}

/// Messaging settings with short timeouts so failing scenarios finish fast.
///
/// A failing delivery is retried for roughly 900ms before it is
/// dead-lettered.
pub fn fast_config() -> MessagingConfig {
    MessagingConfig {
        publish_timeout: Duration::from_secs(1),
        handler_timeout: Duration::from_secs(1),
        retry_base_delay: Duration::from_millis(20),
        retry_max_delay: Duration::from_millis(200),
        outbox_poll_interval: Duration::from_millis(20),
        ..MessagingConfig::default()
    }
}

/// A registration for `email` with otherwise constant fields.
pub fn register(email: &str) -> RegisterUser {
    RegisterUser {
        correlation_id: Uuid::new_v4(),
        first_name: "A".to_owned(),
        last_name: "B".to_owned(),
        email: email.to_owned(),
        password: "x".to_owned(),
    }
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
