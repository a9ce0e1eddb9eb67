//! The turn orchestrator.
//!
//! A turn runs `feedback → session → clean → ask → render`, then clears the feedback
//! and posts exactly one reply into the thread: the answer, or a description of the
//! failure. Every step before the reply is a fallible step in one result chain, and the
//! chain runs under `catch_unwind`, so the feedback is cleared on every exit path.

use std::{any::Any, panic::AssertUnwindSafe};

use futures::FutureExt;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{DEBUG_MARKER, InboundTurn},
    },
    service::{
        assistant::{AssistantClient, AssistantError},
        chat::ChatClient,
        db::{DbClient, thread_session_key},
    },
};

use super::reply::{Diagnostics, render_reply, truncate_error_body};

// Types.

/// Why a turn ended in an error reply.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The assistant API failed.
    #[error(transparent)]
    Remote(#[from] AssistantError),

    /// Anything else that went wrong locally.
    #[error("{0}")]
    Local(anyhow::Error),
}

impl TurnError {
    /// The text posted into the thread for this failure.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::Remote(AssistantError::Rejected { status, body }) => {
                let body = truncate_error_body(body);

                if body.is_empty() {
                    format!(":warning: The documentation assistant returned an error (status {status}).")
                } else {
                    format!(":warning: The documentation assistant returned an error (status {status}): {body}")
                }
            }
            TurnError::Remote(AssistantError::Unavailable(reason)) => format!(":warning: The documentation assistant could not be reached: {reason}"),
            TurnError::Remote(AssistantError::Malformed(reason)) => format!(":warning: The documentation assistant sent a response I could not read: {}", truncate_error_body(reason)),
            TurnError::Local(err) => format!(":warning: Something went wrong while handling this message: {err}"),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The answer was posted.
    Replied,
    /// An error reply was posted (or attempted).
    RepliedError,
}

// Orchestration.

/// Runs one turn to completion.
///
/// Never fails: every failure is turned into an in-thread error reply.
#[instrument(skip_all, fields(channel = %turn.channel_id, ts = %turn.ts))]
pub async fn run_turn(turn: InboundTurn, config: &Config, db: &DbClient, assistant: &AssistantClient, chat: &ChatClient) -> TurnOutcome {
    let reaction = config.processing_reaction.as_str();

    show_feedback(chat, &turn, reaction).await;

    let result = AssertUnwindSafe(compose_reply(&turn, config, db, assistant, chat))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(TurnError::Local(anyhow::anyhow!("turn panicked: {}", panic_message(panic.as_ref())))));

    clear_feedback(chat, &turn, reaction).await;

    match result {
        Ok(text) => match chat.send_message(&turn.channel_id, turn.thread_root(), &text).await {
            Ok(()) => {
                info!("Replied in thread `{}`.", turn.thread_root());
                TurnOutcome::Replied
            }
            Err(err) => {
                error!("Failed to send reply: {}", err);
                report_failure(chat, &turn, &TurnError::Local(err)).await;
                TurnOutcome::RepliedError
            }
        },
        Err(err) => {
            error!("Turn failed: {}", err);
            report_failure(chat, &turn, &err).await;
            TurnOutcome::RepliedError
        }
    }
}

/// The fallible part of a turn: resolves the session, asks the assistant and renders the answer.
async fn compose_reply(turn: &InboundTurn, config: &Config, db: &DbClient, assistant: &AssistantClient, chat: &ChatClient) -> Result<String, TurnError> {
    let session_id = resolve_session(turn, db, assistant).await?;

    let cleaned = clean_text(&turn.text, chat.bot_user_id());

    let diagnostics = turn.debug.then(|| Diagnostics {
        channel_id: turn.channel_id.clone(),
        thread_ts: turn.thread_root().to_string(),
        message_ts: turn.ts.clone(),
        store_key: thread_session_key(&turn.channel_id, turn.thread_root()),
        session_id: session_id.clone(),
        history_folded: turn.history_folded,
        raw_text: turn.raw_text.clone(),
        cleaned_text: cleaned.clone(),
    });

    let reply = assistant.post_turn(&session_id, &cleaned).await?;

    Ok(render_reply(&config.docs_base_url, &reply, diagnostics.as_ref()))
}

/// Looks up the thread's session, creating and storing one when there is none.
///
/// Lookup and creation are not serialized per thread; concurrent first turns may each
/// create a session, and the last write wins.
async fn resolve_session(turn: &InboundTurn, db: &DbClient, assistant: &AssistantClient) -> Result<String, TurnError> {
    let thread_ts = turn.thread_root();

    if let Some(session_id) = db.get_thread_session(&turn.channel_id, thread_ts).await.map_err(TurnError::Local)? {
        return Ok(session_id);
    }

    info!("No session for thread `{}`, creating one.", thread_ts);

    let session_id = assistant.create_session().await?;
    db.put_thread_session(&turn.channel_id, thread_ts, &session_id).await.map_err(TurnError::Local)?;

    Ok(session_id)
}

/// Strips the bot's mention tokens and the debug marker from inbound text.
///
/// Everything else, including indentation inside pasted code, is forwarded as written.
pub fn clean_text(text: &str, bot_user_id: &str) -> String {
    let mention = format!("<@{bot_user_id}>");
    let labelled_mention = format!("<@{bot_user_id}|");

    let mut cleaned = text.to_string();

    for token in [mention.as_str(), DEBUG_MARKER] {
        while let Some(start) = cleaned.find(token) {
            remove_token(&mut cleaned, start, start + token.len());
        }
    }

    // Mentions can also carry a display label, e.g. `<@U123|docs-bot>`.
    while let Some(start) = cleaned.find(&labelled_mention) {
        match cleaned[start..].find('>') {
            Some(end) => remove_token(&mut cleaned, start, start + end + 1),
            None => break,
        }
    }

    cleaned.lines().map(str::trim_end).collect::<Vec<_>>().join("\n").trim().to_string()
}

/// Removes `start..end` along with the spaces that followed it.
fn remove_token(text: &mut String, start: usize, end: usize) {
    let rest = &text[end..];
    let gap = rest.len() - rest.trim_start_matches([' ', '\t']).len();

    text.replace_range(start..end + gap, "");
}

// Feedback.

/// Attaches the processing reaction. Failures are logged only.
async fn show_feedback(chat: &ChatClient, turn: &InboundTurn, reaction: &str) {
    if let Err(err) = chat.react_to_message(&turn.channel_id, &turn.ts, reaction).await {
        warn!("Failed to attach processing reaction: {}", err);
    }
}

/// Removes the processing reaction. Failures are logged only.
async fn clear_feedback(chat: &ChatClient, turn: &InboundTurn, reaction: &str) {
    if let Err(err) = chat.remove_reaction(&turn.channel_id, &turn.ts, reaction).await {
        warn!("Failed to clear processing reaction: {}", err);
    }
}

/// Posts the error reply for a failed turn.
async fn report_failure(chat: &ChatClient, turn: &InboundTurn, err: &TurnError) {
    if let Err(send_err) = chat.send_message(&turn.channel_id, turn.thread_root(), &err.user_message()).await {
        error!("Failed to send error reply: {}", send_err);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// Tests.
