//! Reactions of the Todo context to domain and integration events.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tasklane_contracts::UserCreatedIntegration;
use tasklane_core::clock::Clock;
use tasklane_core::error::DomainError;
use tasklane_core::integration::IntegrationEvent;
use tasklane_core::publisher::DomainEventHandler;
use tasklane_core::unit_of_work::UnitOfWork;
use tasklane_messaging::consumer::IntegrationEventHandler;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::aggregates::TodoList;
use crate::domain::events::{TodoEvent, TodoEventKind};
use crate::infrastructure::context::{TodoContext, TodoContextFactory};

/// Name and description of the list every new user starts with.
pub const DEFAULT_LIST_NAME: &str = "Default";

/// Removes every item of a removed list, in a unit of work of its own.
#[derive(Debug, Clone)]
pub struct TodoListRemovedHandler {
    factory: TodoContextFactory,
}

impl TodoListRemovedHandler {
    #[must_use]
    pub fn new(factory: TodoContextFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl DomainEventHandler<TodoEvent> for TodoListRemovedHandler {
    async fn handle(&self, event: &TodoEvent) -> Result<(), DomainError> {
        let TodoEventKind::TodoListRemoved(removed) = &event.kind else {
            return Ok(());
        };

        let clock = self.factory.clock();
        let mut context = self.factory.create()?;
        let items = context.load_items_for_list(removed.todo_list_id)?;
        let count = items.len();
        for item in items {
            item.remove(event.metadata.correlation_id, clock.as_ref());
        }
        context.commit().await?;

        debug!(
            todo_list_id = %removed.todo_list_id,
            items = count,
            "items of removed list removed"
        );
        Ok(())
    }
}

/// Gives every newly registered user a default list.
///
/// One handler is resolved per delivered message and owns that message's
/// unit of work.
pub struct UserCreatedHandler {
    context: TodoContext,
    clock: Arc<dyn Clock>,
}

impl UserCreatedHandler {
    #[must_use]
    pub fn new(context: TodoContext, clock: Arc<dyn Clock>) -> Self {
        Self { context, clock }
    }
}

impl fmt::Debug for UserCreatedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCreatedHandler")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IntegrationEventHandler<UserCreatedIntegration> for UserCreatedHandler {
    async fn handle(&mut self, event: UserCreatedIntegration) -> Result<(), DomainError> {
        let key = event.dedup_key();
        if self.context.is_processed(&key)? {
            return Err(DomainError::DuplicateMessage(key));
        }

        let list = TodoList::create(
            event.user_id,
            DEFAULT_LIST_NAME,
            DEFAULT_LIST_NAME,
            Uuid::new_v4(),
            self.clock.as_ref(),
        )?;
        let list_id = list.id;
        self.context.add_list(list);
        self.context.record_processed(key);
        self.context.commit().await?;

        info!(user_id = %event.user_id, todo_list_id = %list_id, "default todo list created");
        Ok(())
    }
}
