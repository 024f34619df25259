//! Unit of work for the Account context.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tasklane_core::aggregate::AggregateRoot;
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::unit_of_work::{CommitInterceptor, UnitOfWork};
use tasklane_messaging::outbox::OutboxMessage;
use tasklane_messaging::translator::IntegrationTranslator;
use tracing::debug;
use uuid::Uuid;

use super::database::{AccountDatabase, UserRecord};
use crate::domain::aggregates::User;
use crate::domain::events::AccountEvent;

/// Writes translated integration messages into the outbox as part of a
/// commit.
pub struct OutboxWriter {
    translator: Arc<dyn IntegrationTranslator<AccountEvent>>,
    clock: Arc<dyn Clock>,
}

impl OutboxWriter {
    /// Creates a writer translating with `translator`.
    #[must_use]
    pub fn new(
        translator: Arc<dyn IntegrationTranslator<AccountEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { translator, clock }
    }

    fn rows_for(&self, users: &[User]) -> Result<Vec<OutboxMessage>, DomainError> {
        let mut rows = Vec::new();
        for event in users.iter().flat_map(|user| user.pending_events()) {
            for message in self.translator.translate(event)? {
                rows.push(OutboxMessage::pending(message, self.clock.now()));
            }
        }
        Ok(rows)
    }
}

impl fmt::Debug for OutboxWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxWriter").finish_non_exhaustive()
    }
}

/// Tracks the users touched in one scope and commits them together.
#[derive(Debug)]
pub struct AccountContext {
    db: AccountDatabase,
    interceptor: CommitInterceptor<AccountEvent>,
    outbox: Option<Arc<OutboxWriter>>,
    users: Vec<User>,
}

impl AccountContext {
    /// Opens a scope over `db`. With an `outbox` writer, integration messages
    /// are stored in the same write as the users.
    #[must_use]
    pub fn new(
        db: AccountDatabase,
        interceptor: CommitInterceptor<AccountEvent>,
        outbox: Option<Arc<OutboxWriter>>,
    ) -> Self {
        Self {
            db,
            interceptor,
            outbox,
            users: Vec::new(),
        }
    }

    /// The underlying store, for reads.
    #[must_use]
    pub fn database(&self) -> &AccountDatabase {
        &self.db
    }

    /// Starts tracking a new user.
    pub fn add_user(&mut self, user: User) {
        self.users.push(user);
    }

    /// Loads a user into this scope, or returns the already tracked one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no such user exists.
    pub fn load_user(&mut self, id: Uuid) -> Result<&mut User, DomainError> {
        if let Some(index) = self.users.iter().position(|u| u.id == id) {
            return Ok(&mut self.users[index]);
        }
        let record = self
            .db
            .find_user(id)?
            .ok_or(DomainError::AggregateNotFound(id))?;
        self.users.push(User::from(&record));
        let last = self.users.len() - 1;
        Ok(&mut self.users[last])
    }

    /// The users tracked so far.
    #[must_use]
    pub fn tracked(&self) -> &[User] {
        &self.users
    }
}

#[async_trait]
impl UnitOfWork for AccountContext {
    async fn commit(&mut self) -> Result<(), DomainError> {
        let records = self.users.iter().map(UserRecord::from).collect();
        let outbox = match &self.outbox {
            Some(writer) => writer.rows_for(&self.users)?,
            None => Vec::new(),
        };
        let outbox_rows = outbox.len();
        self.db.write(records, outbox)?;
        debug!(users = self.users.len(), outbox_rows, "account changes written");

        self.interceptor.after_commit(self.users.iter_mut()).await?;
        Ok(())
    }
}
