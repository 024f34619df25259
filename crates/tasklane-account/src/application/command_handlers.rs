//! Command handlers for the Account context.
//!
//! Each handler validates the command, mutates aggregates tracked by the
//! given [`AccountContext`], and commits it. Committing dispatches the
//! recorded domain events.

use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::unit_of_work::UnitOfWork;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{User, normalize_email};
use crate::domain::commands::RegisterUser;
use crate::infrastructure::context::AccountContext;

/// Handles the `RegisterUser` command: checks the email is free, registers
/// the user and commits.
///
/// # Errors
///
/// Returns `DomainError::Conflict` if the email address is already
/// registered, `DomainError::Validation` for invalid input, or any commit
/// error. A `DomainError::Dispatch` means the user was persisted but a local
/// reaction, such as publishing the integration message, failed.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_register_user(
    command: &RegisterUser,
    clock: &dyn Clock,
    context: &mut AccountContext,
) -> Result<Uuid, DomainError> {
    let email = normalize_email(&command.email)?;
    if context.database().find_user_by_email(&email)?.is_some() {
        return Err(DomainError::Conflict(format!(
            "email address {email} already exists"
        )));
    }

    let user = User::register(
        &command.first_name,
        &command.last_name,
        &email,
        &command.password,
        command.correlation_id,
        clock,
    )?;
    let user_id = user.id;
    context.add_user(user);
    context.commit().await?;

    info!(user_id = %user_id, "user registered");
    Ok(user_id)
}
