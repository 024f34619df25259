//! Domain events for the Todo context.

use tasklane_core::event::{DomainEvent, EventMetadata};
use uuid::Uuid;

/// Event type name of [`TodoListCreated`].
pub const TODO_LIST_CREATED_EVENT_TYPE: &str = "todo.todo_list_created";
/// Event type name of [`TodoListRemoved`].
pub const TODO_LIST_REMOVED_EVENT_TYPE: &str = "todo.todo_list_removed";
/// Event type name of [`TodoItemAdded`].
pub const TODO_ITEM_ADDED_EVENT_TYPE: &str = "todo.todo_item_added";
/// Event type name of [`TodoItemFinished`].
pub const TODO_ITEM_FINISHED_EVENT_TYPE: &str = "todo.todo_item_finished";
/// Event type name of [`TodoItemRemoved`].
pub const TODO_ITEM_REMOVED_EVENT_TYPE: &str = "todo.todo_item_removed";

/// Emitted when a todo list is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListCreated {
    /// The list identifier.
    pub todo_list_id: Uuid,
    /// The owning user.
    pub user_id: Uuid,
    /// The list name.
    pub name: String,
}

/// Emitted when a todo list is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListRemoved {
    /// The list identifier.
    pub todo_list_id: Uuid,
}

/// Emitted when an item is added to a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemAdded {
    /// The item identifier.
    pub todo_item_id: Uuid,
    /// The containing list.
    pub todo_list_id: Uuid,
}

/// Emitted when an item is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemFinished {
    /// The item identifier.
    pub todo_item_id: Uuid,
}

/// Emitted when an item is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemRemoved {
    /// The item identifier.
    pub todo_item_id: Uuid,
}

/// Event payload variants for the Todo context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoEventKind {
    /// A list has been created.
    TodoListCreated(TodoListCreated),
    /// A list has been removed.
    TodoListRemoved(TodoListRemoved),
    /// An item has been added.
    TodoItemAdded(TodoItemAdded),
    /// An item has been finished.
    TodoItemFinished(TodoItemFinished),
    /// An item has been removed.
    TodoItemRemoved(TodoItemRemoved),
}

/// Domain event envelope for the Todo context.
#[derive(Debug, Clone)]
pub struct TodoEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TodoEventKind,
}

impl DomainEvent for TodoEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            TodoEventKind::TodoListCreated(_) => TODO_LIST_CREATED_EVENT_TYPE,
            TodoEventKind::TodoListRemoved(_) => TODO_LIST_REMOVED_EVENT_TYPE,
            TodoEventKind::TodoItemAdded(_) => TODO_ITEM_ADDED_EVENT_TYPE,
            TodoEventKind::TodoItemFinished(_) => TODO_ITEM_FINISHED_EVENT_TYPE,
            TodoEventKind::TodoItemRemoved(_) => TODO_ITEM_REMOVED_EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
