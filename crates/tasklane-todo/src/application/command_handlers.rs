//! Command handlers for the Todo context.
//!
//! Each handler loads or creates aggregates in the given [`TodoContext`],
//! applies the command and commits.

use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::unit_of_work::UnitOfWork;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{TodoItem, TodoList};
use crate::domain::commands::{
    AddTodoItem, CreateTodoList, FinishTodoItem, RemoveTodoItem, RemoveTodoList,
};
use crate::infrastructure::context::TodoContext;

/// Handles the `CreateTodoList` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank name, or any commit error.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_create_todo_list(
    command: &CreateTodoList,
    clock: &dyn Clock,
    context: &mut TodoContext,
) -> Result<Uuid, DomainError> {
    let list = TodoList::create(
        command.user_id,
        &command.name,
        &command.description,
        command.correlation_id,
        clock,
    )?;
    let list_id = list.id;
    context.add_list(list);
    context.commit().await?;

    info!(todo_list_id = %list_id, user_id = %command.user_id, "todo list created");
    Ok(list_id)
}

/// Handles the `AddTodoItem` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown list,
/// `DomainError::Validation` if the list is removed or the content blank,
/// or any commit error.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_add_todo_item(
    command: &AddTodoItem,
    clock: &dyn Clock,
    context: &mut TodoContext,
) -> Result<Uuid, DomainError> {
    let list = context.load_list(command.todo_list_id)?;
    let item = TodoItem::add(list, &command.content, command.correlation_id, clock)?;
    let item_id = item.id;
    context.add_item(item);
    context.commit().await?;

    info!(todo_item_id = %item_id, "todo item added");
    Ok(item_id)
}

/// Handles the `FinishTodoItem` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown item,
/// `DomainError::Validation` unless the item is still to do, or any commit
/// error.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_finish_todo_item(
    command: &FinishTodoItem,
    clock: &dyn Clock,
    context: &mut TodoContext,
) -> Result<(), DomainError> {
    context
        .load_item(command.todo_item_id)?
        .finish(command.correlation_id, clock)?;
    context.commit().await?;

    info!(todo_item_id = %command.todo_item_id, "todo item finished");
    Ok(())
}

/// Handles the `RemoveTodoItem` command. Removing an already removed item
/// commits nothing new.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown item, or any
/// commit error.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_remove_todo_item(
    command: &RemoveTodoItem,
    clock: &dyn Clock,
    context: &mut TodoContext,
) -> Result<(), DomainError> {
    context
        .load_item(command.todo_item_id)?
        .remove(command.correlation_id, clock);
    context.commit().await?;

    info!(todo_item_id = %command.todo_item_id, "todo item removed");
    Ok(())
}

/// Handles the `RemoveTodoList` command. The list's items are removed by
/// the local reaction to `TodoListRemoved`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown list,
/// `DomainError::Validation` if it is already removed, or any commit error.
#[instrument(skip(command, clock, context), fields(correlation_id = %command.correlation_id))]
pub async fn handle_remove_todo_list(
    command: &RemoveTodoList,
    clock: &dyn Clock,
    context: &mut TodoContext,
) -> Result<(), DomainError> {
    context
        .load_list(command.todo_list_id)?
        .remove(command.correlation_id, clock)?;
    context.commit().await?;

    info!(todo_list_id = %command.todo_list_id, "todo list removed");
    Ok(())
}
