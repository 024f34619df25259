//! Tasklane node.
//!
//! Hosts the Account and Todo services in one process, connected only
//! through a message broker: Account publishes `UserCreatedIntegration`,
//! Todo consumes it and provisions the user's default list.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tasklane_account::domain::events::AccountEvent;
use tasklane_account::service::AccountService;
use tasklane_core::clock::{Clock, SystemClock};
use tasklane_core::error::{DomainError, MessagingError};
use tasklane_core::publisher::DomainEventHandler;
use tasklane_messaging::config::{DeliveryMode, MessagingConfig};
use tasklane_messaging::consumer::Subscription;
use tasklane_messaging::gateway::MessagingGateway;
use tasklane_messaging::in_memory::InMemoryBroker;
use tasklane_messaging::outbox::RelayHandle;
use tasklane_todo::application::query_handlers::TodoListView;
use tasklane_todo::service::TodoService;
use tracing::info;
use uuid::Uuid;

/// Configures a [`Node`].
pub struct NodeBuilder {
    config: MessagingConfig,
    broker: InMemoryBroker,
    clock: Arc<dyn Clock>,
    account_handlers: Vec<(&'static str, Arc<dyn DomainEventHandler<AccountEvent>>)>,
}

impl NodeBuilder {
    /// Connects to `broker` instead of a fresh one.
    #[must_use]
    pub fn with_broker(mut self, broker: InMemoryBroker) -> Self {
        self.broker = broker;
        self
    }

    /// Uses `clock` in both services.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an extra local handler on the Account service.
    #[must_use]
    pub fn with_account_handler<H>(mut self, event_type: &'static str, handler: H) -> Self
    where
        H: DomainEventHandler<AccountEvent> + 'static,
    {
        self.account_handlers.push((event_type, Arc::new(handler)));
        self
    }

    /// Wires both services to the broker and starts consuming.
    ///
    /// # Errors
    ///
    /// Returns `MessagingError` if the Todo subscription cannot be started.
    pub async fn start(self) -> Result<Node, MessagingError> {
        let delivery_mode = self.config.delivery_mode;
        let poll_interval = self.config.outbox_poll_interval;
        let gateway = MessagingGateway::start(Arc::new(self.broker.clone()), self.config);

        let mut account =
            AccountService::builder(gateway.clone()).with_clock(Arc::clone(&self.clock));
        for (event_type, handler) in self.account_handlers {
            account = account.with_shared_handler(event_type, handler);
        }
        let account = account.build();
        let todo = TodoService::builder().with_clock(self.clock).build();

        let subscription = todo.start_subscriptions(&gateway).await?;
        let relay = match delivery_mode {
            DeliveryMode::Outbox => Some(account.outbox_relay().spawn(poll_interval)),
            DeliveryMode::Direct => None,
        };

        info!(?delivery_mode, "tasklane node started");
        Ok(Node {
            broker: self.broker,
            gateway,
            account,
            todo,
            subscription,
            relay,
        })
    }
}

impl fmt::Debug for NodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Both services and the messaging plumbing between them.
#[derive(Debug)]
pub struct Node {
    broker: InMemoryBroker,
    gateway: MessagingGateway,
    account: AccountService,
    todo: TodoService,
    subscription: Subscription,
    relay: Option<RelayHandle>,
}

impl Node {
    /// Starts configuring a node with `config`.
    #[must_use]
    pub fn builder(config: MessagingConfig) -> NodeBuilder {
        NodeBuilder {
            config,
            broker: InMemoryBroker::new(),
            clock: Arc::new(SystemClock),
            account_handlers: Vec::new(),
        }
    }

    /// The Account service.
    #[must_use]
    pub fn account(&self) -> &AccountService {
        &self.account
    }

    /// The Todo service.
    #[must_use]
    pub fn todo(&self) -> &TodoService {
        &self.todo
    }

    /// The broker both services are connected to.
    #[must_use]
    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }

    /// The shared gateway.
    #[must_use]
    pub fn gateway(&self) -> &MessagingGateway {
        &self.gateway
    }

    /// Polls the Todo store until `user_id` owns at least one list.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Messaging` with a timeout if nothing appeared
    /// within `within`, or any store error.
    pub async fn wait_for_lists(
        &self,
        user_id: Uuid,
        within: Duration,
    ) -> Result<Vec<TodoListView>, DomainError> {
        let poll = async {
            loop {
                let lists = self.todo.lists_for_user(user_id)?;
                if !lists.is_empty() {
                    return Ok::<_, DomainError>(lists);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(within, poll).await.map_err(|_| {
            DomainError::Messaging(MessagingError::Timeout {
                operation: "wait for todo lists",
                after: within,
            })
        })?
    }

    /// Stops consuming and relaying, letting in-flight work finish.
    pub async fn shutdown(self) {
        self.subscription.shutdown().await;
        if let Some(relay) = self.relay {
            relay.shutdown().await;
        }
        info!("tasklane node stopped");
    }
}
