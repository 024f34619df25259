//! Tasklane node entry point.
//!
//! Registers one user from the command line and waits for the Todo service
//! to provision that user's default list through the broker.

use std::error::Error;
use std::time::Duration;

use tasklane_account::domain::commands::RegisterUser;
use tasklane_messaging::config::MessagingConfig;
use tasklane_node::Node;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Tasklane node");

    // Read configuration from environment.
    let config = MessagingConfig::from_env()?;
    let wait_ms: u64 = std::env::var("TASKLANE_WAIT_MS")
        .unwrap_or_else(|_| "5000".to_string())
        .parse()
        .map_err(|e| format!("TASKLANE_WAIT_MS must be a valid u64: {e}"))?;

    // Read the user to register: first name, last name, email, password.
    let mut args = std::env::args().skip(1);
    let mut next_or = |default: &str| args.next().unwrap_or_else(|| default.to_string());
    let command = RegisterUser {
        correlation_id: Uuid::new_v4(),
        first_name: next_or("Ada"),
        last_name: next_or("Lovelace"),
        email: next_or("ada@example.com"),
        password: next_or("analytical-engine"),
    };

    let node = Node::builder(config).start().await?;

    let user_id = node.account().register(&command).await?;
    tracing::info!(%user_id, email = %command.email, "user registered");

    let lists = node
        .wait_for_lists(user_id, Duration::from_millis(wait_ms))
        .await?;
    for list in &lists {
        tracing::info!(
            %user_id,
            todo_list_id = %list.todo_list_id,
            name = %list.name,
            "todo list provisioned"
        );
    }

    node.shutdown().await;
    Ok(())
}
