//! Query handlers for the Todo context.

use serde::Serialize;
use tasklane_core::error::DomainError;
use uuid::Uuid;

use crate::domain::aggregates::TodoItemStatus;
use crate::infrastructure::database::{TodoDatabase, TodoItemRecord, TodoListRecord};

/// Read-only view of a todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoListView {
    /// List identifier.
    pub todo_list_id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

impl From<&TodoListRecord> for TodoListView {
    fn from(record: &TodoListRecord) -> Self {
        Self {
            todo_list_id: record.id,
            user_id: record.user_id,
            name: record.name.clone(),
            description: record.description.clone(),
        }
    }
}

/// Read-only view of a todo item, with its status rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoItemView {
    /// Item identifier.
    pub todo_item_id: Uuid,
    /// Containing list.
    pub todo_list_id: Uuid,
    /// What needs doing.
    pub content: String,
    /// Lifecycle status.
    pub status: TodoItemStatus,
    /// Hex RGB color of the status.
    pub color: &'static str,
}

impl From<&TodoItemRecord> for TodoItemView {
    fn from(record: &TodoItemRecord) -> Self {
        Self {
            todo_item_id: record.id,
            todo_list_id: record.todo_list_id,
            content: record.content.clone(),
            status: record.status,
            color: record.status.color(),
        }
    }
}

/// Lists the user's lists that are not removed, in creation order.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if the store cannot be read.
pub fn get_lists_for_user(
    user_id: Uuid,
    db: &TodoDatabase,
) -> Result<Vec<TodoListView>, DomainError> {
    Ok(db
        .lists_for_user(user_id)?
        .iter()
        .filter(|record| !record.removed)
        .map(TodoListView::from)
        .collect())
}

/// Lists the items of a list that are not removed, in creation order.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown list, or
/// `DomainError::Persistence` if the store cannot be read.
pub fn get_items_for_list(
    todo_list_id: Uuid,
    db: &TodoDatabase,
) -> Result<Vec<TodoItemView>, DomainError> {
    if db.find_list(todo_list_id)?.is_none() {
        return Err(DomainError::AggregateNotFound(todo_list_id));
    }
    Ok(db
        .items_for_list(todo_list_id)?
        .iter()
        .filter(|record| record.status != TodoItemStatus::Removed)
        .map(TodoItemView::from)
        .collect())
}
