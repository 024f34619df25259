//! Unit of work for the Todo context.
//!
//! A [`TodoContext`] tracks lists and items loaded or created in one scope
//! and, for consumers, the dedup keys of the integration messages it
//! handled. Commit writes all of it atomically and then dispatches the
//! harvested events. Handlers reacting to those events open their own
//! context through a [`TodoContextFactory`].

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tasklane_core::aggregate::AggregateRoot;
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::publisher::LocalPublisher;
use tasklane_core::unit_of_work::{CommitInterceptor, UnitOfWork};
use tracing::debug;
use uuid::Uuid;

use super::database::{TodoChanges, TodoDatabase, TodoItemRecord, TodoListRecord};
use crate::domain::aggregates::{TodoItem, TodoList};
use crate::domain::events::TodoEvent;

/// A list or an item tracked by a [`TodoContext`].
#[derive(Debug)]
pub enum TrackedAggregate {
    /// A todo list.
    List(TodoList),
    /// A todo item.
    Item(TodoItem),
}

impl AggregateRoot for TrackedAggregate {
    type Event = TodoEvent;

    fn aggregate_id(&self) -> Uuid {
        match self {
            Self::List(list) => list.aggregate_id(),
            Self::Item(item) => item.aggregate_id(),
        }
    }

    fn pending_events(&self) -> &[TodoEvent] {
        match self {
            Self::List(list) => list.pending_events(),
            Self::Item(item) => item.pending_events(),
        }
    }

    fn drain_pending_events(&mut self) -> Vec<TodoEvent> {
        match self {
            Self::List(list) => list.drain_pending_events(),
            Self::Item(item) => item.drain_pending_events(),
        }
    }
}

/// Tracks the aggregates touched in one scope and commits them together.
#[derive(Debug)]
pub struct TodoContext {
    db: TodoDatabase,
    interceptor: CommitInterceptor<TodoEvent>,
    tracked: Vec<TrackedAggregate>,
    processed: Vec<String>,
}

impl TodoContext {
    /// Opens a scope over `db`.
    #[must_use]
    pub fn new(db: TodoDatabase, interceptor: CommitInterceptor<TodoEvent>) -> Self {
        Self {
            db,
            interceptor,
            tracked: Vec::new(),
            processed: Vec::new(),
        }
    }

    /// The underlying store, for reads.
    #[must_use]
    pub fn database(&self) -> &TodoDatabase {
        &self.db
    }

    /// Starts tracking a new list.
    pub fn add_list(&mut self, list: TodoList) {
        self.tracked.push(TrackedAggregate::List(list));
    }

    /// Starts tracking a new item.
    pub fn add_item(&mut self, item: TodoItem) {
        self.tracked.push(TrackedAggregate::Item(item));
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.tracked.iter().position(|t| t.aggregate_id() == id)
    }

    /// Loads a list into this scope, or returns the already tracked one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no such list exists.
    pub fn load_list(&mut self, id: Uuid) -> Result<&mut TodoList, DomainError> {
        let index = match self.position(id) {
            Some(index) => index,
            None => {
                let record = self
                    .db
                    .find_list(id)?
                    .ok_or(DomainError::AggregateNotFound(id))?;
                self.add_list(TodoList::from(&record));
                self.tracked.len() - 1
            }
        };
        match &mut self.tracked[index] {
            TrackedAggregate::List(list) => Ok(list),
            TrackedAggregate::Item(_) => Err(DomainError::Infrastructure(format!(
                "aggregate {id} is tracked as a todo item"
            ))),
        }
    }

    /// Loads an item into this scope, or returns the already tracked one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no such item exists.
    pub fn load_item(&mut self, id: Uuid) -> Result<&mut TodoItem, DomainError> {
        let index = match self.position(id) {
            Some(index) => index,
            None => {
                let record = self
                    .db
                    .find_item(id)?
                    .ok_or(DomainError::AggregateNotFound(id))?;
                self.add_item(TodoItem::from(&record));
                self.tracked.len() - 1
            }
        };
        match &mut self.tracked[index] {
            TrackedAggregate::Item(item) => Ok(item),
            TrackedAggregate::List(_) => Err(DomainError::Infrastructure(format!(
                "aggregate {id} is tracked as a todo list"
            ))),
        }
    }

    /// Loads every stored item of `todo_list_id` and returns them together
    /// with the ones added in this scope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store cannot be read.
    pub fn load_items_for_list(
        &mut self,
        todo_list_id: Uuid,
    ) -> Result<Vec<&mut TodoItem>, DomainError> {
        for record in self.db.items_for_list(todo_list_id)? {
            if self.position(record.id).is_none() {
                self.add_item(TodoItem::from(&record));
            }
        }
        Ok(self
            .tracked
            .iter_mut()
            .filter_map(|tracked| match tracked {
                TrackedAggregate::Item(item) if item.todo_list_id() == todo_list_id => Some(item),
                _ => None,
            })
            .collect())
    }

    /// Returns `true` if `key` was already committed or recorded in this
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store cannot be read.
    pub fn is_processed(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.processed.iter().any(|k| k == key) || self.db.is_processed(key)?)
    }

    /// Records `key` as handled; it is written with the next commit.
    pub fn record_processed(&mut self, key: impl Into<String>) {
        self.processed.push(key.into());
    }

    /// The aggregates tracked so far.
    #[must_use]
    pub fn tracked(&self) -> &[TrackedAggregate] {
        &self.tracked
    }
}

#[async_trait]
impl UnitOfWork for TodoContext {
    async fn commit(&mut self) -> Result<(), DomainError> {
        let mut changes = TodoChanges {
            processed_keys: self.processed.clone(),
            ..TodoChanges::default()
        };
        for tracked in &self.tracked {
            match tracked {
                TrackedAggregate::List(list) => changes.lists.push(TodoListRecord::from(list)),
                TrackedAggregate::Item(item) => changes.items.push(TodoItemRecord::from(item)),
            }
        }
        let (lists, items) = (changes.lists.len(), changes.items.len());
        self.db.write(changes)?;
        self.processed.clear();
        debug!(lists, items, "todo changes written");

        self.interceptor.after_commit(self.tracked.iter_mut()).await?;
        Ok(())
    }
}

/// Opens [`TodoContext`]s that dispatch through the service's publisher.
///
/// Handlers registered on that publisher hold a factory themselves, so the
/// factory only keeps a weak reference to it.
#[derive(Clone)]
pub struct TodoContextFactory {
    db: TodoDatabase,
    publisher: Weak<LocalPublisher<TodoEvent>>,
    clock: Arc<dyn Clock>,
}

impl TodoContextFactory {
    /// Creates a factory over `db` dispatching through `publisher`.
    #[must_use]
    pub fn new(
        db: TodoDatabase,
        publisher: Weak<LocalPublisher<TodoEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            publisher,
            clock,
        }
    }

    /// Opens a new scope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` once the owning service is gone.
    pub fn create(&self) -> Result<TodoContext, DomainError> {
        let publisher = self
            .publisher
            .upgrade()
            .ok_or_else(|| DomainError::Infrastructure("todo service has shut down".into()))?;
        Ok(TodoContext::new(
            self.db.clone(),
            CommitInterceptor::new(publisher),
        ))
    }

    /// The clock handed to aggregates created in these scopes.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl fmt::Debug for TodoContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoContextFactory")
            .field("publisher_alive", &(self.publisher.strong_count() > 0))
            .finish_non_exhaustive()
    }
}
