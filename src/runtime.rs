//! Runtime services and shared state for the relay.

use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    service::{assistant::AssistantClient, chat::ChatClient, db::DbClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the session store, assistant client, chat client, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The thread session store.
    pub db: DbClient,
    /// The documentation assistant client.
    pub assistant: AssistantClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the session store.
        let db = DbClient::surreal(&config).await?;

        // Initialize the assistant client.
        let assistant = AssistantClient::docs_api(&config)?;

        // Initialize the chat client.
        let chat = ChatClient::slack(&config, db.clone(), assistant.clone()).await?;

        Ok(Self { config, db, assistant, chat })
    }

    /// Start listening for chat events.
    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
