//! Common types shared across the relay.

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Literal marker that turns on diagnostics for a single turn.
pub const DEBUG_MARKER: &str = "[DEBUG]";

/// The kind of inbound chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEventKind {
    /// The bot was @-mentioned directly.
    Mention,
    /// A plain channel or thread message.
    Message,
}

/// The minimal, platform-agnostic view of an inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub kind: ChatEventKind,
    pub channel_id: String,
    /// The id of the message itself.
    pub ts: String,
    /// The root of the thread the message belongs to, if any.
    pub thread_ts: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub text: String,
}

impl ChatEvent {
    /// The thread root: the thread's first message, or the message itself when it is not in a thread yet.
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Whether the message is a reply inside an existing thread.
    pub fn is_thread_reply(&self) -> bool {
        matches!(&self.thread_ts, Some(thread_ts) if *thread_ts != self.ts)
    }

    /// Whether the message carries the diagnostics marker.
    pub fn is_debug(&self) -> bool {
        self.text.contains(DEBUG_MARKER)
    }
}

/// One unit of work for the turn orchestrator.
///
/// Built per admitted event and dropped once the reply has been sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTurn {
    pub channel_id: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    /// The text exactly as the user sent it.
    pub raw_text: String,
    /// The text to forward (the raw text, possibly preceded by folded thread history).
    pub text: String,
    pub debug: bool,
    pub history_folded: bool,
}

impl InboundTurn {
    /// Creates a turn from an event, without any folded history.
    pub fn from_event(event: &ChatEvent) -> Self {
        Self {
            channel_id: event.channel_id.clone(),
            ts: event.ts.clone(),
            thread_ts: event.thread_ts.clone(),
            raw_text: event.text.clone(),
            text: event.text.clone(),
            debug: event.is_debug(),
            history_folded: false,
        }
    }

    /// The thread every reply of this turn is addressed to.
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: &str, thread_ts: Option<&str>, text: &str) -> ChatEvent {
        ChatEvent {
            kind: ChatEventKind::Message,
            channel_id: "C1".to_string(),
            ts: ts.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            user_id: Some("U1".to_string()),
            bot_id: None,
            subtype: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn thread_root_falls_back_to_own_ts() {
        assert_eq!(event("1.1", None, "hi").thread_root(), "1.1");
        assert_eq!(event("1.2", Some("1.1"), "hi").thread_root(), "1.1");
    }

    #[test]
    fn thread_parent_is_not_a_reply() {
        assert!(!event("1.1", None, "hi").is_thread_reply());
        assert!(!event("1.1", Some("1.1"), "hi").is_thread_reply());
        assert!(event("1.2", Some("1.1"), "hi").is_thread_reply());
    }

    #[test]
    fn turn_carries_debug_flag() {
        let turn = InboundTurn::from_event(&event("1.1", None, "[DEBUG] why?"));

        assert!(turn.debug);
        assert!(!turn.history_folded);
        assert_eq!(turn.thread_root(), "1.1");
    }
}
