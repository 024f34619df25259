//! Integration translation for the Account context.

use std::fmt;
use std::sync::Arc;

use tasklane_contracts::UserCreatedIntegration;
use tasklane_core::clock::Clock;
use tasklane_core::error::MessagingError;
use tasklane_messaging::message::OutgoingMessage;
use tasklane_messaging::translator::IntegrationTranslator;

use crate::domain::events::{AccountEvent, AccountEventKind};

/// Announces `UserCreated` as `UserCreatedIntegration`, stamped with the
/// current time.
pub struct UserCreatedTranslator {
    clock: Arc<dyn Clock>,
}

impl UserCreatedTranslator {
    /// Creates a translator stamping messages from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl fmt::Debug for UserCreatedTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreatedTranslator").finish_non_exhaustive()
    }
}

impl IntegrationTranslator<AccountEvent> for UserCreatedTranslator {
    fn translate(&self, event: &AccountEvent) -> Result<Vec<OutgoingMessage>, MessagingError> {
        match &event.kind {
            AccountEventKind::UserCreated(created) => {
                let message = UserCreatedIntegration::new(created.user_id, self.clock.now());
                Ok(vec![OutgoingMessage::encode(&message)?])
            }
        }
    }
}
