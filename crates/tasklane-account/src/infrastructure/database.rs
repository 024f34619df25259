//! In-memory account store.
//!
//! Users and outbox rows live behind one lock, so a unit of work writes
//! both in a single atomic step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tasklane_core::error::DomainError;
use tasklane_messaging::outbox::{OutboxMessage, OutboxStatus, OutboxStore};
use uuid::Uuid;

use crate::domain::aggregates::User;

/// Persisted columns of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// User identifier.
    pub id: Uuid,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Normalized login email.
    pub email: String,
    /// Salted password digest.
    pub password_hash: String,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name().to_owned(),
            last_name: user.last_name().to_owned(),
            email: user.email().to_owned(),
            password_hash: user.password_hash().to_owned(),
        }
    }
}

impl From<&UserRecord> for User {
    fn from(record: &UserRecord) -> Self {
        User::restore(
            record.id,
            record.first_name.clone(),
            record.last_name.clone(),
            record.email.clone(),
            record.password_hash.clone(),
        )
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserRecord>,
    outbox: Vec<OutboxMessage>,
}

/// Shared handle to the account tables. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct AccountDatabase {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl AccountDatabase {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write fail with `DomainError::Persistence`, as an
    /// unreachable database would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, DomainError> {
        self.tables
            .lock()
            .map_err(|_| DomainError::Persistence("account tables lock poisoned".into()))
    }

    /// Upserts `users` and appends `outbox` rows in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` if an email already belongs to another
    /// user, or `DomainError::Persistence` if the store is unavailable.
    /// Nothing is written in either case.
    pub fn write(
        &self,
        users: Vec<UserRecord>,
        outbox: Vec<OutboxMessage>,
    ) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence("account database unavailable".into()));
        }
        let mut tables = self.lock()?;

        for (index, user) in users.iter().enumerate() {
            let taken = tables
                .users
                .iter()
                .chain(&users[..index])
                .any(|other| other.email == user.email && other.id != user.id);
            if taken {
                return Err(DomainError::Conflict(format!(
                    "email address {} already exists",
                    user.email
                )));
            }
        }

        for user in users {
            match tables.users.iter().position(|row| row.id == user.id) {
                Some(index) => tables.users[index] = user,
                None => tables.users.push(user),
            }
        }
        tables.outbox.extend(outbox);
        Ok(())
    }

    /// Looks up a user by id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DomainError> {
        Ok(self.lock()?.users.iter().find(|u| u.id == id).cloned())
    }

    /// Looks up a user by normalized email.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DomainError> {
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    /// Every user, in registration order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn users(&self) -> Result<Vec<UserRecord>, DomainError> {
        Ok(self.lock()?.users.clone())
    }

    /// Every outbox row, in write order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn outbox(&self) -> Result<Vec<OutboxMessage>, DomainError> {
        Ok(self.lock()?.outbox.clone())
    }
}

#[async_trait]
impl OutboxStore for AccountDatabase {
    async fn pending_messages(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, DomainError> {
        Ok(self
            .lock()?
            .outbox
            .iter()
            .filter(|row| row.is_due(now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn failed_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>, DomainError> {
        Ok(self
            .lock()?
            .outbox
            .iter()
            .filter(|row| row.status == OutboxStatus::Failed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_message(&self, message: &OutboxMessage) -> Result<(), DomainError> {
        let mut tables = self.lock()?;
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.id == message.id)
            .ok_or_else(|| DomainError::Persistence(format!("outbox row {} missing", message.id)))?;
        *row = message.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tasklane_core::aggregate::AggregateRoot;
    use tasklane_test_support::FixedClock;

    use super::*;

    fn record(email: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            first_name: "A".to_owned(),
            last_name: "B".to_owned(),
            email: email.to_owned(),
            password_hash: "digest".to_owned(),
        }
    }

    #[test]
    fn test_user_restored_from_record_has_nothing_pending() {
        // Arrange
        let user = User::register(
            "A",
            "B",
            "a@b.com",
            "x",
            Uuid::new_v4(),
            &FixedClock::morning(),
        )
        .unwrap();

        // Act
        let record = UserRecord::from(&user);
        let restored = User::from(&record);

        // Assert
        assert_eq!(record.email, "a@b.com");
        assert_eq!(restored.id, user.id);
        assert!(restored.pending_events().is_empty());
        assert!(restored.verify_password("x"));
    }

    #[test]
    fn test_write_rejects_email_owned_by_another_user() {
        // Arrange
        let db = AccountDatabase::new();
        db.write(vec![record("a@b.com")], Vec::new()).unwrap();

        // Act
        let result = db.write(vec![record("a@b.com")], Vec::new());

        // Assert
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(db.users().unwrap().len(), 1);
    }

    #[test]
    fn test_write_rejects_duplicate_emails_within_one_batch() {
        let db = AccountDatabase::new();

        let result = db.write(vec![record("a@b.com"), record("a@b.com")], Vec::new());

        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert!(db.users().unwrap().is_empty());
    }

    #[test]
    fn test_write_updates_existing_user_in_place() {
        let db = AccountDatabase::new();
        let mut user = record("a@b.com");
        db.write(vec![user.clone()], Vec::new()).unwrap();
        user.first_name = "Changed".to_owned();

        db.write(vec![user.clone()], Vec::new()).unwrap();

        assert_eq!(db.users().unwrap(), vec![user]);
    }

    #[test]
    fn test_unavailable_database_writes_nothing() {
        let db = AccountDatabase::new();
        db.set_unavailable(true);

        let result = db.write(vec![record("a@b.com")], Vec::new());

        assert!(matches!(result, Err(DomainError::Persistence(_))));
        assert!(db.find_user_by_email("a@b.com").unwrap().is_none());
    }
}
