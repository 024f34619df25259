//! Commands for the Todo context.

use uuid::Uuid;

/// Command to create a todo list for a user.
#[derive(Debug, Clone)]
pub struct CreateTodoList {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The owning user.
    pub user_id: Uuid,
    /// The list name.
    pub name: String,
    /// Free-form description; may be empty.
    pub description: String,
}

/// Command to add an item to a list.
#[derive(Debug, Clone)]
pub struct AddTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The containing list.
    pub todo_list_id: Uuid,
    /// What needs doing.
    pub content: String,
}

/// Command to finish an item.
#[derive(Debug, Clone)]
pub struct FinishTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The item identifier.
    pub todo_item_id: Uuid,
}

/// Command to remove a single item.
#[derive(Debug, Clone)]
pub struct RemoveTodoItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The item identifier.
    pub todo_item_id: Uuid,
}

/// Command to remove a list together with its items.
#[derive(Debug, Clone)]
pub struct RemoveTodoList {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The list identifier.
    pub todo_list_id: Uuid,
}
