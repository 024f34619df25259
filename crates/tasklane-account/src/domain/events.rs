//! Domain events for the Account context.

use tasklane_core::event::{DomainEvent, EventMetadata};
use uuid::Uuid;

/// Event type name of [`UserCreated`].
pub const USER_CREATED_EVENT_TYPE: &str = "account.user_created";

/// Emitted when a user registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCreated {
    /// The new user's identifier.
    pub user_id: Uuid,
}

/// Event payload variants for the Account context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEventKind {
    /// A user has registered.
    UserCreated(UserCreated),
}

/// Domain event envelope for the Account context.
#[derive(Debug, Clone)]
pub struct AccountEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: AccountEventKind,
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            AccountEventKind::UserCreated(_) => USER_CREATED_EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
