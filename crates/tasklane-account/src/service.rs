//! Account service: wires the local publisher, the translator and the
//! store into per-request units of work.

use std::fmt;
use std::sync::Arc;

use tasklane_core::clock::{Clock, SystemClock};
use tasklane_core::error::DomainError;
use tasklane_core::publisher::{DomainEventHandler, LocalPublisher};
use tasklane_core::unit_of_work::CommitInterceptor;
use tasklane_messaging::config::DeliveryMode;
use tasklane_messaging::gateway::MessagingGateway;
use tasklane_messaging::outbox::OutboxRelay;
use tasklane_messaging::translator::TranslatingHandler;
use tracing::info;
use uuid::Uuid;

use crate::application::query_handlers::{self, AuthenticationResult, UserView};
use crate::application::{command_handlers, translators::UserCreatedTranslator};
use crate::domain::commands::{Login, RegisterUser};
use crate::domain::events::{AccountEvent, USER_CREATED_EVENT_TYPE};
use crate::infrastructure::context::{AccountContext, OutboxWriter};
use crate::infrastructure::database::AccountDatabase;

type Registration = (&'static str, Arc<dyn DomainEventHandler<AccountEvent>>);

/// Configures an [`AccountService`].
pub struct AccountServiceBuilder {
    gateway: MessagingGateway,
    db: AccountDatabase,
    clock: Arc<dyn Clock>,
    handlers: Vec<Registration>,
}

impl AccountServiceBuilder {
    /// Uses `db` instead of a fresh store.
    #[must_use]
    pub fn with_database(mut self, db: AccountDatabase) -> Self {
        self.db = db;
        self
    }

    /// Uses `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an additional local handler, invoked after the integration
    /// translator.
    #[must_use]
    pub fn with_handler<H>(self, event_type: &'static str, handler: H) -> Self
    where
        H: DomainEventHandler<AccountEvent> + 'static,
    {
        self.with_shared_handler(event_type, Arc::new(handler))
    }

    /// Registers an already shared local handler.
    #[must_use]
    pub fn with_shared_handler(
        mut self,
        event_type: &'static str,
        handler: Arc<dyn DomainEventHandler<AccountEvent>>,
    ) -> Self {
        self.handlers.push((event_type, handler));
        self
    }

    /// Builds the service. The gateway's `delivery_mode` decides whether
    /// `UserCreated` is published from the local publisher or written to the
    /// outbox.
    #[must_use]
    pub fn build(self) -> AccountService {
        let delivery_mode = self.gateway.config().delivery_mode;
        let translator = Arc::new(UserCreatedTranslator::new(Arc::clone(&self.clock)));

        let mut builder = LocalPublisher::builder();
        let outbox = match delivery_mode {
            DeliveryMode::Direct => {
                builder = builder.register(
                    USER_CREATED_EVENT_TYPE,
                    TranslatingHandler::new(Arc::clone(&translator), self.gateway.clone()),
                );
                None
            }
            DeliveryMode::Outbox => Some(Arc::new(OutboxWriter::new(
                translator,
                Arc::clone(&self.clock),
            ))),
        };
        for (event_type, handler) in self.handlers {
            builder = builder.register_shared(event_type, handler);
        }

        info!(?delivery_mode, "account service ready");
        AccountService {
            db: self.db,
            clock: self.clock,
            gateway: self.gateway,
            interceptor: CommitInterceptor::new(Arc::new(builder.build())),
            outbox,
        }
    }
}

impl fmt::Debug for AccountServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountServiceBuilder")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Entry point of the Account context.
pub struct AccountService {
    db: AccountDatabase,
    clock: Arc<dyn Clock>,
    gateway: MessagingGateway,
    interceptor: CommitInterceptor<AccountEvent>,
    outbox: Option<Arc<OutboxWriter>>,
}

impl fmt::Debug for AccountService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService")
            .field("interceptor", &self.interceptor)
            .field("outbox", &self.outbox.is_some())
            .finish_non_exhaustive()
    }
}

impl AccountService {
    /// Starts configuring a service that publishes through `gateway`.
    #[must_use]
    pub fn builder(gateway: MessagingGateway) -> AccountServiceBuilder {
        AccountServiceBuilder {
            gateway,
            db: AccountDatabase::new(),
            clock: Arc::new(SystemClock),
            handlers: Vec::new(),
        }
    }

    /// The service's store.
    #[must_use]
    pub fn database(&self) -> &AccountDatabase {
        &self.db
    }

    /// Opens a new unit of work.
    #[must_use]
    pub fn context(&self) -> AccountContext {
        AccountContext::new(self.db.clone(), self.interceptor.clone(), self.outbox.clone())
    }

    /// Registers a user in a fresh unit of work.
    ///
    /// # Errors
    ///
    /// See [`command_handlers::handle_register_user`].
    pub async fn register(&self, command: &RegisterUser) -> Result<Uuid, DomainError> {
        let mut context = self.context();
        command_handlers::handle_register_user(command, self.clock.as_ref(), &mut context).await
    }

    /// Checks credentials.
    ///
    /// # Errors
    ///
    /// See [`query_handlers::login`].
    pub fn login(&self, query: &Login) -> Result<AuthenticationResult, DomainError> {
        query_handlers::login(query, &self.db)
    }

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unknown id.
    pub fn find_user(&self, user_id: Uuid) -> Result<UserView, DomainError> {
        query_handlers::get_user_by_id(user_id, &self.db)
    }

    /// Lists every user.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Persistence` if the store cannot be read.
    pub fn list_users(&self) -> Result<Vec<UserView>, DomainError> {
        query_handlers::list_users(&self.db)
    }

    /// A relay publishing this service's outbox through its gateway.
    #[must_use]
    pub fn outbox_relay(&self) -> OutboxRelay<AccountDatabase> {
        OutboxRelay::new(
            Arc::new(self.db.clone()),
            self.gateway.clone(),
            Arc::clone(&self.clock),
        )
    }
}

#[cfg(test)]
mod tests {
    use tasklane_contracts::UserCreatedIntegration;
    use tasklane_core::error::MessagingError;
    use tasklane_core::integration::IntegrationEvent;
    use tasklane_messaging::config::MessagingConfig;
    use tasklane_messaging::in_memory::InMemoryBroker;
    use tasklane_messaging::outbox::OutboxStatus;
    use tasklane_test_support::{FailingBroker, FixedClock, RecordingHandler};

    use super::*;

    fn register_command() -> RegisterUser {
        RegisterUser {
            correlation_id: Uuid::new_v4(),
            first_name: "A".to_owned(),
            last_name: "B".to_owned(),
            email: "a@b.com".to_owned(),
            password: "x".to_owned(),
        }
    }

    fn service(broker: InMemoryBroker, config: MessagingConfig) -> AccountService {
        AccountService::builder(MessagingGateway::start(Arc::new(broker), config))
            .with_clock(Arc::new(FixedClock::morning()))
            .build()
    }

    #[tokio::test]
    async fn test_register_publishes_one_integration_message() {
        // Arrange
        let broker = InMemoryBroker::new();
        let recorder = RecordingHandler::new();
        let service = AccountService::builder(MessagingGateway::start(
            Arc::new(broker.clone()),
            MessagingConfig::default(),
        ))
        .with_clock(Arc::new(FixedClock::morning()))
        .with_handler(USER_CREATED_EVENT_TYPE, recorder.clone())
        .build();

        // Act
        let user_id = service.register(&register_command()).await.unwrap();

        // Assert
        assert_eq!(recorder.count(), 1);
        assert_eq!(broker.published_count(UserCreatedIntegration::CHANNEL), 1);
        assert_eq!(service.find_user(user_id).unwrap().email, "a@b.com");
        assert_eq!(service.list_users().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_on_closed_connection_returns_messaging_error_after_persisting() {
        // Arrange
        let service = AccountService::builder(MessagingGateway::start(
            Arc::new(FailingBroker),
            MessagingConfig::default(),
        ))
        .build();

        // Act
        let result = service.register(&register_command()).await;

        // Assert
        let err = result.unwrap_err();
        assert!(matches!(err, DomainError::Dispatch { .. }));
        assert!(matches!(
            err.root_cause(),
            DomainError::Messaging(MessagingError::ConnectionClosed)
        ));
        assert_eq!(service.list_users().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outbox_mode_defers_publishing_to_the_relay() {
        // Arrange
        let broker = InMemoryBroker::new();
        let config = MessagingConfig {
            delivery_mode: DeliveryMode::Outbox,
            ..MessagingConfig::default()
        };
        let service = service(broker.clone(), config);

        // Act
        service.register(&register_command()).await.unwrap();
        let before_relay = broker.published_count(UserCreatedIntegration::CHANNEL);
        let drained = service.outbox_relay().drain_once().await.unwrap();

        // Assert
        assert_eq!(before_relay, 0);
        assert_eq!(drained.published, 1);
        assert_eq!(broker.published_count(UserCreatedIntegration::CHANNEL), 1);
        assert_eq!(
            service.database().outbox().unwrap()[0].status,
            OutboxStatus::Published
        );
    }

    #[tokio::test]
    async fn test_outbox_mode_keeps_registration_when_broker_is_down() {
        // Arrange
        let broker = InMemoryBroker::new();
        broker.close();
        let config = MessagingConfig {
            delivery_mode: DeliveryMode::Outbox,
            ..MessagingConfig::default()
        };
        let service = service(broker, config);

        // Act
        let result = service.register(&register_command()).await;
        let drained = service.outbox_relay().drain_once().await.unwrap();

        // Assert
        assert!(result.is_ok());
        assert_eq!(drained.released, 1);
        assert!(service.database().outbox().unwrap()[0].is_pending());
    }

    #[tokio::test]
    async fn test_login_after_register() {
        let service = service(InMemoryBroker::new(), MessagingConfig::default());
        let user_id = service.register(&register_command()).await.unwrap();

        let result = service
            .login(&Login {
                email: "a@b.com".to_owned(),
                password: "x".to_owned(),
            })
            .unwrap();

        assert_eq!(result.user_id, user_id);
        assert_eq!(result.full_name, "A B");
    }
}
