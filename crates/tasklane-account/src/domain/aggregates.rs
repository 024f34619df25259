//! Aggregate roots for the Account context.

use sha2::{Digest, Sha256};
use tasklane_core::aggregate::{AggregateRoot, PendingEvents};
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::event::EventMetadata;
use uuid::Uuid;

use super::events::{AccountEvent, AccountEventKind, UserCreated};

/// The aggregate root for a user account.
#[derive(Debug)]
pub struct User {
    /// Aggregate identifier.
    pub id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    /// Events recorded since the last commit.
    pending: PendingEvents<AccountEvent>,
}

impl User {
    /// Registers a new user, producing a `UserCreated` event.
    ///
    /// The email is trimmed and lower-cased. The password is stored as a
    /// SHA-256 digest salted with the user id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a name or the password is blank,
    /// or the email is not an address.
    pub fn register(
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let first_name = required("first name", first_name)?;
        let last_name = required("last name", last_name)?;
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(DomainError::Validation("password must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let mut user = Self {
            id,
            first_name,
            last_name,
            email,
            password_hash: digest_password(id, password),
            pending: PendingEvents::new(),
        };
        user.pending.record(AccountEvent {
            metadata: EventMetadata::new(id, correlation_id, clock),
            kind: AccountEventKind::UserCreated(UserCreated { user_id: id }),
        });
        Ok(user)
    }

    /// Rebuilds a stored user. Nothing is pending afterwards.
    pub(crate) fn restore(
        id: Uuid,
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
    ) -> Self {
        Self {
            id,
            first_name,
            last_name,
            email,
            password_hash,
            pending: PendingEvents::new(),
        }
    }

    /// Given name.
    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Family name.
    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// Normalized login email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Salted SHA-256 digest of the password, hex encoded.
    pub(crate) fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Returns `true` if `password` matches the stored digest.
    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        digest_password(self.id, password) == self.password_hash
    }
}

impl AggregateRoot for User {
    type Event = AccountEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn pending_events(&self) -> &[AccountEvent] {
        self.pending.as_slice()
    }

    fn drain_pending_events(&mut self) -> Vec<AccountEvent> {
        self.pending.drain()
    }
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

/// Trims and lower-cases `email`.
pub(crate) fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::Validation(format!(
            "'{email}' is not an email address"
        ))),
    }
}

fn digest_password(user_id: Uuid, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
