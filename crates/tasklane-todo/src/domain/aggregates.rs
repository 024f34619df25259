//! Aggregate roots for the Todo context.

use std::fmt;

use serde::Serialize;
use tasklane_core::aggregate::{AggregateRoot, PendingEvents};
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::event::EventMetadata;
use uuid::Uuid;

use super::events::{
    TodoEvent, TodoEventKind, TodoItemAdded, TodoItemFinished, TodoItemRemoved, TodoListCreated,
    TodoListRemoved,
};

/// Progress of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TodoItemStatus {
    /// Still to do.
    Todo,
    /// Done.
    Finished,
    /// Removed, directly or with its list.
    Removed,
}

impl TodoItemStatus {
    /// Display color as a hex RGB string.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Todo => "#FFDD00",
            Self::Finished => "#30CC30",
            Self::Removed => "#666666",
        }
    }
}

impl fmt::Display for TodoItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Todo => f.write_str("Todo"),
            Self::Finished => f.write_str("Finished"),
            Self::Removed => f.write_str("Removed"),
        }
    }
}

fn event(
    aggregate_id: Uuid,
    kind: TodoEventKind,
    correlation_id: Uuid,
    clock: &dyn Clock,
) -> TodoEvent {
    TodoEvent {
        metadata: EventMetadata::new(aggregate_id, correlation_id, clock),
        kind,
    }
}

/// The aggregate root for a todo list.
#[derive(Debug)]
pub struct TodoList {
    /// Aggregate identifier.
    pub id: Uuid,
    user_id: Uuid,
    name: String,
    description: String,
    removed: bool,
    pending: PendingEvents<TodoEvent>,
}

impl TodoList {
    /// Creates a list owned by `user_id`, producing a `TodoListCreated`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `name` is blank.
    pub fn create(
        user_id: Uuid,
        name: &str,
        description: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("list name must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let mut list = Self {
            id,
            user_id,
            name: name.to_owned(),
            description: description.trim().to_owned(),
            removed: false,
            pending: PendingEvents::new(),
        };
        list.pending.record(event(
            id,
            TodoEventKind::TodoListCreated(TodoListCreated {
                todo_list_id: id,
                user_id,
                name: list.name.clone(),
            }),
            correlation_id,
            clock,
        ));
        Ok(list)
    }

    /// Removes the list, producing a `TodoListRemoved` event. Its items are
    /// removed by the reaction to that event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the list is already removed.
    pub fn remove(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.removed {
            return Err(DomainError::Validation(format!(
                "todo list {} is already removed",
                self.id
            )));
        }
        self.removed = true;
        self.pending.record(event(
            self.id,
            TodoEventKind::TodoListRemoved(TodoListRemoved {
                todo_list_id: self.id,
            }),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    /// Rebuilds a stored list with nothing pending.
    pub(crate) fn restore(
        id: Uuid,
        user_id: Uuid,
        name: String,
        description: String,
        removed: bool,
    ) -> Self {
        Self {
            id,
            user_id,
            name,
            description,
            removed,
            pending: PendingEvents::new(),
        }
    }

    /// The owning user.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// The list name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The list description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns `true` once the list was removed.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

impl AggregateRoot for TodoList {
    type Event = TodoEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn pending_events(&self) -> &[TodoEvent] {
        self.pending.as_slice()
    }

    fn drain_pending_events(&mut self) -> Vec<TodoEvent> {
        self.pending.drain()
    }
}

/// The aggregate root for a todo item.
#[derive(Debug)]
pub struct TodoItem {
    /// Aggregate identifier.
    pub id: Uuid,
    todo_list_id: Uuid,
    content: String,
    status: TodoItemStatus,
    pending: PendingEvents<TodoEvent>,
}

impl TodoItem {
    /// Creates an item on `list`, producing a `TodoItemAdded` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `content` is blank or the list is
    /// removed.
    pub fn add(
        list: &TodoList,
        content: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if list.is_removed() {
            return Err(DomainError::Validation(format!(
                "todo list {} is removed",
                list.id
            )));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(DomainError::Validation("item content must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let mut item = Self {
            id,
            todo_list_id: list.id,
            content: content.to_owned(),
            status: TodoItemStatus::Todo,
            pending: PendingEvents::new(),
        };
        item.pending.record(event(
            id,
            TodoEventKind::TodoItemAdded(TodoItemAdded {
                todo_item_id: id,
                todo_list_id: list.id,
            }),
            correlation_id,
            clock,
        ));
        Ok(item)
    }

    /// Marks the item finished, producing a `TodoItemFinished` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the item is still to do.
    pub fn finish(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.status != TodoItemStatus::Todo {
            return Err(DomainError::Validation(format!(
                "todo item {} is {} and cannot be finished",
                self.id, self.status
            )));
        }
        self.status = TodoItemStatus::Finished;
        self.pending.record(event(
            self.id,
            TodoEventKind::TodoItemFinished(TodoItemFinished {
                todo_item_id: self.id,
            }),
            correlation_id,
            clock,
        ));
        Ok(())
    }

    /// Marks the item removed, producing a `TodoItemRemoved` event. Removing
    /// a removed item changes nothing.
    pub fn remove(&mut self, correlation_id: Uuid, clock: &dyn Clock) {
        if self.status == TodoItemStatus::Removed {
            return;
        }
        self.status = TodoItemStatus::Removed;
        self.pending.record(event(
            self.id,
            TodoEventKind::TodoItemRemoved(TodoItemRemoved {
                todo_item_id: self.id,
            }),
            correlation_id,
            clock,
        ));
    }

    pub(crate) fn restore(
        id: Uuid,
        todo_list_id: Uuid,
        content: String,
        status: TodoItemStatus,
    ) -> Self {
        Self {
            id,
            todo_list_id,
            content,
            status,
            pending: PendingEvents::new(),
        }
    }

    /// The containing list.
    #[must_use]
    pub fn todo_list_id(&self) -> Uuid {
        self.todo_list_id
    }

    /// What needs doing.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Current progress.
    #[must_use]
    pub fn status(&self) -> TodoItemStatus {
        self.status
    }
}

impl AggregateRoot for TodoItem {
    type Event = TodoEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn pending_events(&self) -> &[TodoEvent] {
        self.pending.as_slice()
    }

    fn drain_pending_events(&mut self) -> Vec<TodoEvent> {
        self.pending.drain()
    }
}

#[cfg(test)]
mod tests {
    use tasklane_core::event::DomainEvent;
    use tasklane_test_support::FixedClock;

    use super::*;
    use crate::domain::events::{
        TODO_ITEM_FINISHED_EVENT_TYPE, TODO_ITEM_REMOVED_EVENT_TYPE, TODO_LIST_REMOVED_EVENT_TYPE,
    };

    fn list() -> TodoList {
        TodoList::create(
            Uuid::new_v4(),
            "Groceries",
            "Weekly",
            Uuid::new_v4(),
            &FixedClock::morning(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_records_todo_list_created() {
        // Arrange
        let user_id = Uuid::new_v4();

        // Act
        let list = TodoList::create(
            user_id,
            " Default ",
            "Default",
            Uuid::new_v4(),
            &FixedClock::morning(),
        )
        .unwrap();

        // Assert
        assert_eq!(list.name(), "Default");
        assert_eq!(list.user_id(), user_id);
        assert_eq!(
            list.pending_events()[0].kind,
            TodoEventKind::TodoListCreated(TodoListCreated {
                todo_list_id: list.id,
                user_id,
                name: "Default".to_owned(),
            })
        );
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let result = TodoList::create(
            Uuid::new_v4(),
            "  ",
            "",
            Uuid::new_v4(),
            &FixedClock::morning(),
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_remove_twice_is_rejected() {
        // Arrange
        let clock = FixedClock::morning();
        let mut list = list();
        list.drain_pending_events();

        // Act
        list.remove(Uuid::new_v4(), &clock).unwrap();
        let second = list.remove(Uuid::new_v4(), &clock);

        // Assert
        assert!(list.is_removed());
        assert!(matches!(second, Err(DomainError::Validation(_))));
        let pending = list.pending_events();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type(), TODO_LIST_REMOVED_EVENT_TYPE);
    }

    #[test]
    fn test_item_cannot_be_added_to_removed_list() {
        let clock = FixedClock::morning();
        let mut list = list();
        list.remove(Uuid::new_v4(), &clock).unwrap();

        let result = TodoItem::add(&list, "Milk", Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_finish_then_remove_records_both_transitions() {
        // Arrange
        let clock = FixedClock::morning();
        let mut item = TodoItem::add(&list(), "Milk", Uuid::new_v4(), &clock).unwrap();
        item.drain_pending_events();

        // Act
        item.finish(Uuid::new_v4(), &clock).unwrap();
        item.remove(Uuid::new_v4(), &clock);
        item.remove(Uuid::new_v4(), &clock);

        // Assert
        let types: Vec<&str> = item.pending_events().iter().map(DomainEvent::event_type).collect();
        assert_eq!(types, vec![TODO_ITEM_FINISHED_EVENT_TYPE, TODO_ITEM_REMOVED_EVENT_TYPE]);
        assert_eq!(item.status(), TodoItemStatus::Removed);
    }

    #[test]
    fn test_finished_item_cannot_be_finished_again() {
        let clock = FixedClock::morning();
        let mut item = TodoItem::add(&list(), "Milk", Uuid::new_v4(), &clock).unwrap();
        item.finish(Uuid::new_v4(), &clock).unwrap();

        let result = item.finish(Uuid::new_v4(), &clock);

        match result.unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("Finished")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_status_colors() {
        assert_eq!(TodoItemStatus::Todo.color(), "#FFDD00");
        assert_eq!(TodoItemStatus::Finished.color(), "#30CC30");
        assert_eq!(TodoItemStatus::Removed.color(), "#666666");
    }
}
