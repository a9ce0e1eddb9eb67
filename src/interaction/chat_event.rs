//! Routing of inbound chat events.
//!
//! Decides whether an event should be answered at all, folds thread history into
//! mention turns, and hands admitted turns to the orchestrator.

use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{ChatEvent, ChatEventKind, InboundTurn, Res},
    },
    service::{
        assistant::AssistantClient,
        chat::{ChatClient, HistoryMessage},
        db::DbClient,
    },
};

use super::turn::{TurnOutcome, run_turn};

/// Message subtypes that still count as ordinary user messages.
const ANSWERABLE_SUBTYPES: &[&str] = &["thread_broadcast", "file_share"];

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The event was not admitted.
    Skipped(&'static str),
    /// The event ran as a turn.
    Handled(TurnOutcome),
}

/// Handles an inbound chat event.
///
/// Spawns a new task so the platform listener is never blocked by a turn.
#[instrument(skip_all)]
pub fn handle_chat_event(event: ChatEvent, config: Config, db: DbClient, assistant: AssistantClient, chat: ChatClient) {
    tokio::spawn(
        async move {
            // Process the event.
            let result = process_chat_event(event, &config, &db, &assistant, &chat).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling: {}", err);
            }
        }
        .in_current_span(),
    );
}

/// Admits, prepares, and runs a single event.
#[instrument(skip_all, fields(channel = %event.channel_id, ts = %event.ts))]
pub async fn process_chat_event(event: ChatEvent, config: &Config, db: &DbClient, assistant: &AssistantClient, chat: &ChatClient) -> Res<Dispatch> {
    if let Err(reason) = admission_check(&event, chat.bot_user_id()) {
        info!("Skipping event: {}.", reason);
        return Ok(Dispatch::Skipped(reason));
    }

    let turn = match event.kind {
        ChatEventKind::Mention => mention_turn(&event, chat).await,
        ChatEventKind::Message => {
            // Plain follow-ups only count once the bot has answered in the thread.
            if db.get_thread_session(&event.channel_id, event.thread_root()).await?.is_none() {
                info!("Skipping event: no session for thread `{}`.", event.thread_root());
                return Ok(Dispatch::Skipped("thread has no session"));
            }

            InboundTurn::from_event(&event)
        }
    };

    let outcome = run_turn(turn, config, db, assistant, chat).await;

    Ok(Dispatch::Handled(outcome))
}

/// The stateless admission rules.
///
/// Mentions are always admitted unless the bot wrote them itself. Plain messages must be
/// non-empty thread replies that do not mention the bot; those mentions arrive again as
/// mention events.
pub fn admission_check(event: &ChatEvent, bot_user_id: &str) -> Result<(), &'static str> {
    if event.bot_id.is_some() || event.user_id.as_deref() == Some(bot_user_id) {
        return Err("self-authored");
    }

    if event.kind == ChatEventKind::Mention {
        return Ok(());
    }

    if let Some(subtype) = event.subtype.as_deref()
        && !ANSWERABLE_SUBTYPES.contains(&subtype)
    {
        return Err("unsupported message subtype");
    }

    if event.text.trim().is_empty() {
        return Err("empty text");
    }

    if !event.is_thread_reply() {
        return Err("not in a thread");
    }

    if event.text.contains(&format!("<@{bot_user_id}")) {
        return Err("mentions the bot");
    }

    Ok(())
}

/// Builds the turn for a mention, folding in the visible thread history.
async fn mention_turn(event: &ChatEvent, chat: &ChatClient) -> InboundTurn {
    let mut turn = InboundTurn::from_event(event);

    if event.thread_ts.is_none() {
        return turn;
    }

    let history = match chat.get_thread_history(&event.channel_id, event.thread_root()).await {
        Ok(history) => history,
        Err(err) => {
            warn!("Failed to fetch thread history, continuing without it: {}", err);
            return turn;
        }
    };

    if let Some(folded) = fold_history(&history, &event.ts, &event.text) {
        turn.text = folded;
        turn.history_folded = true;
    }

    turn
}

/// Prefixes `current` with the earlier messages of the thread.
///
/// Returns `None` when there is nothing before the current message.
pub fn fold_history(history: &[HistoryMessage], current_ts: &str, current: &str) -> Option<String> {
    let previous = history
        .iter()
        .filter(|message| message.ts != current_ts && !message.text.trim().is_empty())
        .map(|message| {
            if message.from_bot {
                format!("Assistant: {}", message.text.trim())
            } else {
                format!("User {}: {}", message.user_id.as_deref().unwrap_or("unknown"), message.text.trim())
            }
        })
        .collect::<Vec<_>>();

    if previous.is_empty() {
        return None;
    }

    Some(format!("Previous conversation:\n{}\n\nCurrent message:\n{}", previous.join("\n"), current))
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "UBOT";

    fn event(kind: ChatEventKind, ts: &str, thread_ts: Option<&str>, text: &str) -> ChatEvent {
        ChatEvent {
            kind,
            channel_id: "C1".to_string(),
            ts: ts.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            user_id: Some("U1".to_string()),
            bot_id: None,
            subtype: None,
            text: text.to_string(),
        }
    }

    fn history(ts: &str, user: Option<&str>, text: &str, from_bot: bool) -> HistoryMessage {
        HistoryMessage {
            ts: ts.to_string(),
            user_id: user.map(str::to_string),
            text: text.to_string(),
            from_bot,
        }
    }

    #[test]
    fn mentions_are_admitted_anywhere() {
        assert!(admission_check(&event(ChatEventKind::Mention, "1.1", None, "<@UBOT> hi"), BOT).is_ok());
        assert!(admission_check(&event(ChatEventKind::Mention, "1.2", Some("1.1"), ""), BOT).is_ok());
    }

    #[test]
    fn thread_replies_are_admitted() {
        assert!(admission_check(&event(ChatEventKind::Message, "1.2", Some("1.1"), "and then?"), BOT).is_ok());
    }

    #[test]
    fn top_level_messages_are_rejected() {
        assert_eq!(admission_check(&event(ChatEventKind::Message, "1.1", None, "hello"), BOT), Err("not in a thread"));
        assert_eq!(admission_check(&event(ChatEventKind::Message, "1.1", Some("1.1"), "hello"), BOT), Err("not in a thread"));
    }

    #[test]
    fn empty_messages_are_rejected() {
        assert_eq!(admission_check(&event(ChatEventKind::Message, "1.2", Some("1.1"), "  "), BOT), Err("empty text"));
    }

    #[test]
    fn self_authored_events_are_rejected() {
        let mut own = event(ChatEventKind::Message, "1.2", Some("1.1"), "answer");
        own.user_id = Some(BOT.to_string());
        assert_eq!(admission_check(&own, BOT), Err("self-authored"));

        let mut bot = event(ChatEventKind::Mention, "1.2", Some("1.1"), "<@UBOT>");
        bot.bot_id = Some("B1".to_string());
        assert_eq!(admission_check(&bot, BOT), Err("self-authored"));
    }

    #[test]
    fn edits_and_deletions_are_rejected() {
        let mut edited = event(ChatEventKind::Message, "1.2", Some("1.1"), "changed");
        edited.subtype = Some("message_changed".to_string());
        assert_eq!(admission_check(&edited, BOT), Err("unsupported message subtype"));

        let mut broadcast = event(ChatEventKind::Message, "1.2", Some("1.1"), "also to channel");
        broadcast.subtype = Some("thread_broadcast".to_string());
        assert!(admission_check(&broadcast, BOT).is_ok());
    }

    #[test]
    fn messages_mentioning_the_bot_are_left_to_the_mention_event() {
        assert_eq!(admission_check(&event(ChatEventKind::Message, "1.2", Some("1.1"), "<@UBOT> again"), BOT), Err("mentions the bot"));
    }

    #[test]
    fn history_is_folded_before_current_message() {
        let messages = vec![
            history("1.1", Some("U1"), "How do I deploy?", false),
            history("1.2", Some("UBOT"), "Use the CLI.", true),
            history("1.3", Some("U2"), "<@UBOT> which flags?", false),
        ];

        let folded = fold_history(&messages, "1.3", "<@UBOT> which flags?").unwrap();

        assert_eq!(
            folded,
            "Previous conversation:\nUser U1: How do I deploy?\nAssistant: Use the CLI.\n\nCurrent message:\n<@UBOT> which flags?"
        );
    }

    #[test]
    fn nothing_to_fold_for_a_lone_message() {
        let messages = vec![history("1.1", Some("U1"), "<@UBOT> hi", false)];

        assert_eq!(fold_history(&messages, "1.1", "<@UBOT> hi"), None);
        assert_eq!(fold_history(&[], "1.1", "hi"), None);
    }
}
