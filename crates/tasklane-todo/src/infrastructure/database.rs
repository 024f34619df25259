//! In-memory todo store.
//!
//! Lists, items and the keys of already processed integration messages share
//! one lock. A consumer's unit of work records its message key in the same
//! write as the aggregates it touched, which makes redelivery harmless.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tasklane_core::error::DomainError;
use uuid::Uuid;

use crate::domain::aggregates::{TodoItem, TodoItemStatus, TodoList};

/// Persisted columns of a todo list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListRecord {
    /// List identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Soft-delete flag.
    pub removed: bool,
}

/// Persisted columns of a todo item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemRecord {
    /// Item identifier.
    pub id: Uuid,
    /// Containing list.
    pub todo_list_id: Uuid,
    /// What needs doing.
    pub content: String,
    /// Lifecycle status.
    pub status: TodoItemStatus,
}

impl From<&TodoList> for TodoListRecord {
    fn from(list: &TodoList) -> Self {
        Self {
            id: list.id,
            user_id: list.user_id(),
            name: list.name().to_owned(),
            description: list.description().to_owned(),
            removed: list.is_removed(),
        }
    }
}

impl From<&TodoListRecord> for TodoList {
    fn from(record: &TodoListRecord) -> Self {
        TodoList::restore(
            record.id,
            record.user_id,
            record.name.clone(),
            record.description.clone(),
            record.removed,
        )
    }
}

impl From<&TodoItem> for TodoItemRecord {
    fn from(item: &TodoItem) -> Self {
        Self {
            id: item.id,
            todo_list_id: item.todo_list_id(),
            content: item.content().to_owned(),
            status: item.status(),
        }
    }
}

impl From<&TodoItemRecord> for TodoItem {
    fn from(record: &TodoItemRecord) -> Self {
        TodoItem::restore(
            record.id,
            record.todo_list_id,
            record.content.clone(),
            record.status,
        )
    }
}

/// Everything one unit of work writes.
#[derive(Debug, Default)]
pub struct TodoChanges {
    /// Lists to insert or replace.
    pub lists: Vec<TodoListRecord>,
    /// Items to insert or replace.
    pub items: Vec<TodoItemRecord>,
    /// Dedup keys of integration messages handled by this unit of work.
    pub processed_keys: Vec<String>,
}

#[derive(Debug, Default)]
struct Tables {
    lists: Vec<TodoListRecord>,
    items: Vec<TodoItemRecord>,
    processed: HashSet<String>,
}

/// Shared handle to the todo tables. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct TodoDatabase {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl TodoDatabase {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later write fail with `DomainError::Persistence`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, DomainError> {
        self.tables
            .lock()
            .map_err(|_| DomainError::Persistence("todo tables lock poisoned".into()))
    }

    /// Applies `changes` in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateMessage` if one of the processed keys
    /// was already recorded, or `DomainError::Persistence` if the store is
    /// unavailable. Nothing is written in either case.
    pub fn write(&self, changes: TodoChanges) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence("todo database unavailable".into()));
        }
        let mut tables = self.lock()?;

        if let Some(key) = changes
            .processed_keys
            .iter()
            .find(|key| tables.processed.contains(*key))
        {
            return Err(DomainError::DuplicateMessage(key.clone()));
        }

        for list in changes.lists {
            match tables.lists.iter().position(|row| row.id == list.id) {
                Some(index) => tables.lists[index] = list,
                None => tables.lists.push(list),
            }
        }
        for item in changes.items {
            match tables.items.iter().position(|row| row.id == item.id) {
                Some(index) => tables.items[index] = item,
                None => tables.items.push(item),
            }
        }
        tables.processed.extend(changes.processed_keys);
        Ok(())
    }

    /// Looks up a list by id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn find_list(&self, id: Uuid) -> Result<Option<TodoListRecord>, DomainError> {
        Ok(self.lock()?.lists.iter().find(|l| l.id == id).cloned())
    }

    /// Looks up an item by id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn find_item(&self, id: Uuid) -> Result<Option<TodoItemRecord>, DomainError> {
        Ok(self.lock()?.items.iter().find(|i| i.id == id).cloned())
    }

    /// Lists owned by `user_id`, in creation order, removed ones included.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<TodoListRecord>, DomainError> {
        Ok(self
            .lock()?
            .lists
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Items of `todo_list_id`, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn items_for_list(&self, todo_list_id: Uuid) -> Result<Vec<TodoItemRecord>, DomainError> {
        Ok(self
            .lock()?
            .items
            .iter()
            .filter(|i| i.todo_list_id == todo_list_id)
            .cloned()
            .collect())
    }

    /// Returns `true` if a message with `key` was already handled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the tables cannot be read.
    pub fn is_processed(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.lock()?.processed.contains(key))
    }
}
