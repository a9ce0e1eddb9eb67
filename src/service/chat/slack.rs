//! Chat service integration for the relay.
//!
//! This module provides functionality for interacting with Slack:
//! - Receiving mention and message events over socket mode
//! - Sending threaded replies and managing reactions
//! - Retrieving thread history
//!
//! It implements the `GenericChatClient` trait on top of `slack-morphism`.

use crate::{
    base::{
        config::Config,
        types::{ChatEvent, ChatEventKind, Res, Void},
    },
    interaction,
    service::{assistant::AssistantClient, db::DbClient},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::{errors::SlackClientError, prelude::*};
use tracing::{debug, info, instrument, warn};

use std::{ops::Deref, sync::Arc};

use super::{ChatClient, GenericChatClient, HistoryMessage};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, db: DbClient, assistant: AssistantClient) -> Res<Self> {
        let client = SlackChatClient::new(config, db, assistant).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    config: Config,
    db: DbClient,
    assistant: AssistantClient,
    chat: ChatClient,
    bot_user_id: String,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub config: Config,
    pub db: DbClient,
    pub assistant: AssistantClient,
}

impl Deref for SlackChatClient {
    type Target = FullClient;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, db: DbClient, assistant: AssistantClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            config: config.clone(),
            db,
            assistant,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            config: self.config.clone(),
            db: self.db.clone(),
            assistant: self.assistant.clone(),
            chat: ChatClient::from(self.clone()),
            bot_user_id: self.bot_user_id.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events.
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, thread_ts: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message)
            .with_thread_ts(SlackTs(thread_ts.to_string()))
            .with_unfurl_links(false);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn react_to_message(&self, channel_id: &str, ts: &str, emoji: &str) -> Void {
        let request = SlackApiReactionsAddRequest {
            channel: SlackChannelId(channel_id.to_string()),
            name: SlackReactionName(emoji.to_string()),
            timestamp: SlackTs(ts.to_string()),
        };

        let session = self.client.open_session(&self.bot_token);

        let _ = session.reactions_add(&request).await.map_err(|e| anyhow::anyhow!("Failed to react to message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_reaction(&self, channel_id: &str, ts: &str, emoji: &str) -> Void {
        let request = SlackApiReactionsRemoveRequest::new(SlackReactionName(emoji.to_string()))
            .with_channel(SlackChannelId(channel_id.to_string()))
            .with_timestamp(SlackTs(ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.reactions_remove(&request).await.map_err(|e| anyhow::anyhow!("Failed to remove reaction: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_thread_history(&self, channel_id: &str, thread_ts: &str) -> Res<Vec<HistoryMessage>> {
        let request = SlackApiConversationsRepliesRequest::new(SlackChannelId(channel_id.to_string()), SlackTs(thread_ts.to_string()));
        let session = self.client.open_session(&self.bot_token);

        let response = session.conversations_replies(&request).await;

        let response = if let Err(e) = &response
            && let SlackClientError::ApiError(ae) = e
            && ae.code == "thread_not_found"
        {
            // A top-level message has no thread yet.
            return Ok(Vec::new());
        } else {
            response?
        };

        let messages = response
            .messages
            .into_iter()
            .map(|message| {
                let user_id = message.sender.user.map(|u| u.0);
                let from_bot = message.sender.bot_id.is_some() || user_id.as_deref() == Some(self.bot_user_id.as_str());

                HistoryMessage {
                    ts: message.origin.ts.0,
                    user_id,
                    text: message.content.text.unwrap_or_default(),
                    from_bot,
                }
            })
            .collect();

        Ok(messages)
    }
}

// Event conversion.

/// Flattens a Slack message event into a `ChatEvent`.
///
/// Returns `None` when the event has no channel.
pub fn chat_event_from_message(event: &SlackMessageEvent) -> Option<ChatEvent> {
    let channel_id = event.origin.channel.as_ref()?.0.clone();
    let subtype = event.subtype.as_ref().and_then(|s| serde_json::to_value(s).ok()).and_then(|v| v.as_str().map(str::to_string));

    Some(ChatEvent {
        kind: ChatEventKind::Message,
        channel_id,
        ts: event.origin.ts.0.clone(),
        thread_ts: event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
        user_id: event.sender.user.as_ref().map(|u| u.0.clone()),
        bot_id: event.sender.bot_id.as_ref().map(|b| b.0.clone()),
        subtype,
        text: event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default(),
    })
}

/// Flattens a Slack app mention event into a `ChatEvent`.
pub fn chat_event_from_mention(event: &SlackAppMentionEvent) -> ChatEvent {
    ChatEvent {
        kind: ChatEventKind::Mention,
        channel_id: event.channel.0.clone(),
        ts: event.origin.ts.0.clone(),
        thread_ts: event.origin.thread_ts.as_ref().map(|ts| ts.0.clone()),
        user_id: Some(event.user.0.clone()),
        bot_id: None,
        subtype: None,
        text: event.content.text.clone().unwrap_or_default(),
    }
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    warn!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("No app commands are currently supported.".into())))
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    warn!("[INTERACTION] {:#?}", event);
    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    let chat_event = match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            debug!("Received message event ...");

            let Some(chat_event) = chat_event_from_message(&slack_message_event) else {
                warn!("Skipping message event without a channel.");
                return Ok(());
            };

            chat_event
        }
        SlackEventCallbackBody::AppMention(slack_app_mention_event) => {
            info!("Received app mention event ...");

            chat_event_from_mention(&slack_app_mention_event)
        }
        _ => {
            warn!("Received unhandled push event.");
            return Ok(());
        }
    };

    debug!("Dispatching event `{}` for bot `{}`.", chat_event.ts, user_state.bot_user_id);

    interaction::chat_event::handle_chat_event(
        chat_event,
        user_state.config.clone(),
        user_state.db.clone(),
        user_state.assistant.clone(),
        user_state.chat.clone(),
    );

    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn thread_reply_is_flattened() {
        let event: SlackMessageEvent = serde_json::from_value(json!({
            "channel": "C1",
            "user": "U1",
            "text": "follow up",
            "ts": "1700.2",
            "thread_ts": "1700.1"
        }))
        .unwrap();

        let chat_event = chat_event_from_message(&event).unwrap();

        assert_eq!(chat_event.kind, ChatEventKind::Message);
        assert_eq!(chat_event.channel_id, "C1");
        assert_eq!(chat_event.ts, "1700.2");
        assert_eq!(chat_event.thread_ts.as_deref(), Some("1700.1"));
        assert_eq!(chat_event.user_id.as_deref(), Some("U1"));
        assert_eq!(chat_event.text, "follow up");
        assert!(chat_event.bot_id.is_none());
    }

    #[test]
    fn bot_message_keeps_bot_id_and_subtype() {
        let event: SlackMessageEvent = serde_json::from_value(json!({
            "channel": "C1",
            "bot_id": "B1",
            "subtype": "bot_message",
            "text": "beep",
            "ts": "1700.3"
        }))
        .unwrap();

        let chat_event = chat_event_from_message(&event).unwrap();

        assert_eq!(chat_event.bot_id.as_deref(), Some("B1"));
        assert_eq!(chat_event.subtype.as_deref(), Some("bot_message"));
        assert_eq!(chat_event.thread_ts, None);
    }
}
