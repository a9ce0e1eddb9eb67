pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, Void};

// Types.

/// A message already present in a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub ts: String,
    pub user_id: Option<String>,
    pub text: String,
    /// Whether the message was posted by a bot (including this one).
    pub from_bot: bool,
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the relay.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Used to strip the bot's own mention from inbound text and to ignore
    /// messages the bot wrote itself.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// This sets up event listeners for the chat platform and begins processing
    /// incoming messages and events.
    async fn start(&self) -> Void;

    /// Send a message to a channel thread.
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void;

    /// React to a message with an emoji.
    async fn react_to_message(&self, channel_id: &str, ts: &str, emoji: &str) -> Void;

    /// Remove the bot's own emoji reaction from a message.
    async fn remove_reaction(&self, channel_id: &str, ts: &str, emoji: &str) -> Void;

    /// Get the messages of a thread, oldest first.
    ///
    /// A thread that does not exist (yet) yields an empty history.
    async fn get_thread_history(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<HistoryMessage>>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
