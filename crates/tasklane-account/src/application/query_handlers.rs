//! Query handlers for the Account context.
//!
//! This module contains read-only handlers that return view DTOs.

use serde::Serialize;
use tasklane_core::error::DomainError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{User, normalize_email};
use crate::domain::commands::Login;
use crate::infrastructure::database::{AccountDatabase, UserRecord};

/// Read-only view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    /// The user identifier.
    pub user_id: Uuid,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Login email.
    pub email: String,
}

impl From<&UserRecord> for UserView {
    fn from(record: &UserRecord) -> Self {
        Self {
            user_id: record.id,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email.clone(),
        }
    }
}

/// Outcome of a successful login. Issuing a token is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationResult {
    /// The authenticated user.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// "First Last".
    pub full_name: String,
}

/// Checks `query`'s credentials.
///
/// # Errors
///
/// Returns `DomainError::Validation` with the same message for an unknown
/// email and for a wrong password.
pub fn login(query: &Login, db: &AccountDatabase) -> Result<AuthenticationResult, DomainError> {
    let rejected = || DomainError::Validation("invalid email or password".into());

    let email = normalize_email(&query.email).map_err(|_| rejected())?;
    let Some(record) = db.find_user_by_email(&email)? else {
        warn!("login for unknown email");
        return Err(rejected());
    };
    let user = User::from(&record);
    if !user.verify_password(&query.password) {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(rejected());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(AuthenticationResult {
        user_id: user.id,
        email: user.email().to_owned(),
        full_name: format!("{} {}", user.first_name(), user.last_name()),
    })
}

/// Retrieves a user by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no such user exists.
pub fn get_user_by_id(user_id: Uuid, db: &AccountDatabase) -> Result<UserView, DomainError> {
    db.find_user(user_id)?
        .as_ref()
        .map(UserView::from)
        .ok_or(DomainError::AggregateNotFound(user_id))
}

/// Lists every user in registration order.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if the store cannot be read.
pub fn list_users(db: &AccountDatabase) -> Result<Vec<UserView>, DomainError> {
    Ok(db.users()?.iter().map(UserView::from).collect())
}
