//! Todo service: owns the local publisher and the store, opens units of
//! work, and subscribes to the integration events the context reacts to.

use std::fmt;
use std::sync::Arc;

use tasklane_contracts::UserCreatedIntegration;
use tasklane_core::clock::{Clock, SystemClock};
use tasklane_core::error::{DomainError, MessagingError};
use tasklane_core::publisher::{DomainEventHandler, LocalPublisher};
use tasklane_messaging::consumer::Subscription;
use tasklane_messaging::gateway::MessagingGateway;
use tracing::info;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::application::event_handlers::{TodoListRemovedHandler, UserCreatedHandler};
use crate::application::query_handlers::{self, TodoItemView, TodoListView};
use crate::domain::commands::{
    AddTodoItem, CreateTodoList, FinishTodoItem, RemoveTodoItem, RemoveTodoList,
};
use crate::domain::events::{TODO_LIST_REMOVED_EVENT_TYPE, TodoEvent};
use crate::infrastructure::context::{TodoContext, TodoContextFactory};
use crate::infrastructure::database::TodoDatabase;

type Registration = (&'static str, Arc<dyn DomainEventHandler<TodoEvent>>);

/// Configures a [`TodoService`].
pub struct TodoServiceBuilder {
    db: TodoDatabase,
    clock: Arc<dyn Clock>,
    handlers: Vec<Registration>,
}

impl TodoServiceBuilder {
    /// Uses `db` instead of a fresh store.
    #[must_use]
    pub fn with_database(mut self, db: TodoDatabase) -> Self {
        self.db = db;
        self
    }

    /// Uses `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an additional local handler, invoked after the built-in
    /// reactions.
    #[must_use]
    pub fn with_handler<H>(mut self, event_type: &'static str, handler: H) -> Self
    where
        H: DomainEventHandler<TodoEvent> + 'static,
    {
        self.handlers.push((event_type, Arc::new(handler)));
        self
    }

    /// Builds the service.
    #[must_use]
    pub fn build(self) -> TodoService {
        let Self {
            db,
            clock,
            handlers,
        } = self;

        let publisher = Arc::new_cyclic(|publisher| {
            let factory =
                TodoContextFactory::new(db.clone(), publisher.clone(), Arc::clone(&clock));
            let mut builder = LocalPublisher::builder()
                .register(TODO_LIST_REMOVED_EVENT_TYPE, TodoListRemovedHandler::new(factory));
            for (event_type, handler) in handlers {
                builder = builder.register_shared(event_type, handler);
            }
            builder.build()
        });
        let factory =
            TodoContextFactory::new(db.clone(), Arc::downgrade(&publisher), Arc::clone(&clock));

        info!("todo service ready");
        TodoService {
            db,
            clock,
            publisher,
            factory,
        }
    }
}

impl fmt::Debug for TodoServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoServiceBuilder")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Entry point of the Todo context.
pub struct TodoService {
    db: TodoDatabase,
    clock: Arc<dyn Clock>,
    publisher: Arc<LocalPublisher<TodoEvent>>,
    factory: TodoContextFactory,
}

impl fmt::Debug for TodoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoService")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl TodoService {
    /// Starts configuring a service.
    #[must_use]
    pub fn builder() -> TodoServiceBuilder {
        TodoServiceBuilder {
            db: TodoDatabase::new(),
            clock: Arc::new(SystemClock),
            handlers: Vec::new(),
        }
    }

    /// The service's store.
    #[must_use]
    pub fn database(&self) -> &TodoDatabase {
        &self.db
    }

    /// Opens a new unit of work.
    ///
    /// # Errors
    ///
    /// See [`TodoContextFactory::create`].
    pub fn context(&self) -> Result<TodoContext, DomainError> {
        self.factory.create()
    }

    /// Resolves a `UserCreatedIntegration` handler bound to a fresh unit of
    /// work.
    ///
    /// # Errors
    ///
    /// See [`TodoContextFactory::create`].
    pub fn user_created_handler(&self) -> Result<UserCreatedHandler, DomainError> {
        Ok(UserCreatedHandler::new(self.factory.create()?, self.factory.clock()))
    }

    /// Consumes `UserCreatedIntegration` through `gateway`, one unit of work
    /// per delivered message.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the subscription cannot be started.
    pub async fn start_subscriptions(
        &self,
        gateway: &MessagingGateway,
    ) -> Result<Subscription, MessagingError> {
        let factory = self.factory.clone();
        gateway
            .subscribe::<UserCreatedIntegration, _>(
                move || -> Result<UserCreatedHandler, DomainError> {
                    Ok(UserCreatedHandler::new(factory.create()?, factory.clock()))
                },
            )
            .await
    }

    /// Creates a list.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_create_todo_list`].
    pub async fn create_list(&self, command: &CreateTodoList) -> Result<Uuid, DomainError> {
        let mut context = self.context()?;
        command_handlers::handle_create_todo_list(command, self.clock.as_ref(), &mut context).await
    }

    /// Adds an item to a list.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_add_todo_item`].
    pub async fn add_item(&self, command: &AddTodoItem) -> Result<Uuid, DomainError> {
        let mut context = self.context()?;
        command_handlers::handle_add_todo_item(command, self.clock.as_ref(), &mut context).await
    }

    /// Finishes an item.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_finish_todo_item`].
    pub async fn finish_item(&self, command: &FinishTodoItem) -> Result<(), DomainError> {
        let mut context = self.context()?;
        command_handlers::handle_finish_todo_item(command, self.clock.as_ref(), &mut context).await
    }

    /// Removes one item from its list.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_remove_todo_item`].
    pub async fn remove_item(&self, command: &RemoveTodoItem) -> Result<(), DomainError> {
        let mut context = self.context()?;
        command_handlers::handle_remove_todo_item(command, self.clock.as_ref(), &mut context).await
    }

    /// Removes a list and, through the local reaction, its items.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_remove_todo_list`].
    pub async fn remove_list(&self, command: &RemoveTodoList) -> Result<(), DomainError> {
        let mut context = self.context()?;
        command_handlers::handle_remove_todo_list(command, self.clock.as_ref(), &mut context).await
    }

    /// The user's lists.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::get_lists_for_user`].
    pub fn lists_for_user(&self, user_id: Uuid) -> Result<Vec<TodoListView>, DomainError> {
        query_handlers::get_lists_for_user(user_id, &self.db)
    }

    /// A list's items.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::get_items_for_list`].
    pub fn items_for_list(&self, todo_list_id: Uuid) -> Result<Vec<TodoItemView>, DomainError> {
        query_handlers::get_items_for_list(todo_list_id, &self.db)
    }
}

#[cfg(test)]
mod tests {
    use tasklane_core::integration::IntegrationEvent;
    use tasklane_messaging::config::MessagingConfig;
    use tasklane_messaging::consumer::IntegrationEventHandler;
    use tasklane_messaging::in_memory::InMemoryBroker;
    use tasklane_messaging::message::OutgoingMessage;
    use tasklane_test_support::{FixedClock, RecordingHandler};

    use super::*;
    use crate::domain::aggregates::TodoItemStatus;
    use crate::domain::events::TODO_ITEM_REMOVED_EVENT_TYPE;

    fn service() -> TodoService {
        TodoService::builder()
            .with_clock(Arc::new(FixedClock::morning()))
            .build()
    }

    async fn list_with_items(service: &TodoService, contents: &[&str]) -> (Uuid, Vec<Uuid>) {
        let list_id = service
            .create_list(&CreateTodoList {
                correlation_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                name: "Groceries".to_owned(),
                description: String::new(),
            })
            .await
            .unwrap();
        let mut item_ids = Vec::new();
        for content in contents {
            let item_id = service
                .add_item(&AddTodoItem {
                    correlation_id: Uuid::new_v4(),
                    todo_list_id: list_id,
                    content: (*content).to_owned(),
                })
                .await
                .unwrap();
            item_ids.push(item_id);
        }
        (list_id, item_ids)
    }

    #[tokio::test]
    async fn test_remove_list_cascades_to_items_through_local_handler() {
        // Arrange
        let recorder = RecordingHandler::new();
        let service = TodoService::builder()
            .with_clock(Arc::new(FixedClock::morning()))
            .with_handler(TODO_ITEM_REMOVED_EVENT_TYPE, recorder.clone())
            .build();
        let (list_id, item_ids) = list_with_items(&service, &["Milk", "Eggs"]).await;
        service
            .finish_item(&FinishTodoItem {
                correlation_id: Uuid::new_v4(),
                todo_item_id: item_ids[0],
            })
            .await
            .unwrap();

        // Act
        service
            .remove_list(&RemoveTodoList {
                correlation_id: Uuid::new_v4(),
                todo_list_id: list_id,
            })
            .await
            .unwrap();

        // Assert
        for item_id in item_ids {
            let stored = service.database().find_item(item_id).unwrap().unwrap();
            assert_eq!(stored.status, TodoItemStatus::Removed);
        }
        assert_eq!(recorder.count(), 2);
        assert!(service.items_for_list(list_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_item_hides_it_from_the_list() {
        // Arrange
        let recorder = RecordingHandler::new();
        let service = TodoService::builder()
            .with_clock(Arc::new(FixedClock::morning()))
            .with_handler(TODO_ITEM_REMOVED_EVENT_TYPE, recorder.clone())
            .build();
        let (list_id, item_ids) = list_with_items(&service, &["Milk", "Eggs"]).await;

        // Act
        service
            .remove_item(&RemoveTodoItem {
                correlation_id: Uuid::new_v4(),
                todo_item_id: item_ids[0],
            })
            .await
            .unwrap();

        // Assert
        let removed = service.database().find_item(item_ids[0]).unwrap().unwrap();
        assert_eq!(removed.status, TodoItemStatus::Removed);
        assert_eq!(recorder.count(), 1);
        let remaining = service.items_for_list(list_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].todo_item_id, item_ids[1]);
    }

    #[tokio::test]
    async fn test_user_created_handler_provisions_default_list() {
        // Arrange
        let service = service();
        let user_id = Uuid::new_v4();
        let mut handler = service.user_created_handler().unwrap();

        // Act
        handler
            .handle(UserCreatedIntegration::new(user_id, FixedClock::morning().0))
            .await
            .unwrap();

        // Assert
        let lists = service.lists_for_user(user_id).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "Default");
    }

    #[tokio::test]
    async fn test_subscription_consumes_user_created_from_broker() {
        // Arrange
        let broker = InMemoryBroker::new();
        let gateway = MessagingGateway::start(Arc::new(broker.clone()), MessagingConfig::default());
        let service = service();
        let subscription = service.start_subscriptions(&gateway).await.unwrap();
        let user_id = Uuid::new_v4();

        // Act
        gateway
            .send(
                OutgoingMessage::encode(&UserCreatedIntegration::new(
                    user_id,
                    FixedClock::morning().0,
                ))
                .unwrap(),
            )
            .await
            .unwrap();
        let mut lists = Vec::new();
        for _ in 0..100 {
            lists = service.lists_for_user(user_id).unwrap();
            if !lists.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // Assert
        assert_eq!(subscription.channel(), UserCreatedIntegration::CHANNEL);
        assert_eq!(lists.len(), 1);
        subscription.shutdown().await;
    }
}
