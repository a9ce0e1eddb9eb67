//! Integration with the hosted documentation assistant.
//!
//! The assistant keeps conversational context in remote sessions (topics). The relay
//! only ever creates a session and posts turns to it.
//!
//! The module defines the `GenericAssistantClient` trait, with a default implementation
//! over the assistant's HTTP API.

pub mod docs_api;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Delimiter between the display text and the serialized sources in a turn response.
pub const SOURCES_DELIMITER: &str = "||";

// Errors.

/// Failures surfaced by the assistant client.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The API answered with a non-success status.
    #[error("assistant API rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The API could not be reached.
    #[error("assistant API is unavailable: {0}")]
    Unavailable(String),

    /// A success response could not be understood.
    #[error("assistant API returned a malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

// Types.

/// A source the assistant cited for its answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    /// The cited link, possibly relative to the documentation site.
    pub link: String,
    pub title: Option<String>,
}

/// The assistant's answer to one turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssistantReply {
    /// The answer in documentation markdown.
    pub text: String,
    /// Cited sources, in the order the assistant gave them.
    pub sources: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    link: String,
    #[serde(default)]
    metadata: Option<RawSourceMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawSourceMetadata {
    #[serde(default)]
    title: Option<String>,
}

impl From<RawSource> for Citation {
    fn from(source: RawSource) -> Self {
        Self {
            link: source.link,
            title: source.metadata.and_then(|m| m.title).filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Splits a raw turn response into display text and sources.
///
/// A source segment that does not parse is dropped with a warning; the display text is
/// always returned.
pub fn parse_reply(raw: &str) -> AssistantReply {
    let Some((text, sources)) = raw.split_once(SOURCES_DELIMITER) else {
        return AssistantReply {
            text: raw.trim().to_string(),
            sources: Vec::new(),
        };
    };

    let sources = sources.trim();
    let sources = if sources.is_empty() {
        Vec::new()
    } else {
        match serde_json::from_str::<Vec<RawSource>>(sources) {
            Ok(sources) => sources.into_iter().map(Citation::from).collect(),
            Err(err) => {
                warn!("Dropping unparseable assistant sources: {}", err);
                Vec::new()
            }
        }
    };

    AssistantReply {
        text: text.trim().to_string(),
        sources,
    }
}

// Traits.

/// Generic assistant client trait that clients must implement.
///
/// No retries happen at this level: every call is a single request/response.
#[async_trait]
pub trait GenericAssistantClient: Send + Sync + 'static {
    /// Create a new remote conversation session, returning its id.
    async fn create_session(&self) -> Result<String, AssistantError>;

    /// Post one turn to an existing session.
    async fn post_turn(&self, session_id: &str, message: &str) -> Result<AssistantReply, AssistantError>;
}

// Structs.

/// Assistant client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct AssistantClient {
    inner: Arc<dyn GenericAssistantClient>,
}

impl Deref for AssistantClient {
    type Target = dyn GenericAssistantClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl AssistantClient {
    pub fn new(inner: Arc<dyn GenericAssistantClient>) -> Self {
        Self { inner }
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_without_delimiter_has_no_sources() {
        let reply = parse_reply("Just an answer.\n");

        assert_eq!(reply.text, "Just an answer.");
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn response_with_sources_is_split() {
        let reply = parse_reply("Answer text||[{\"link\":\"a\"}]");

        assert_eq!(reply.text, "Answer text");
        assert_eq!(reply.sources, vec![Citation { link: "a".to_string(), title: None }]);
    }

    #[test]
    fn source_titles_come_from_metadata() {
        let reply = parse_reply(r#"Answer||[{"link":"guides/setup","metadata":{"title":"Setup"}},{"link":"https://x.dev/b","metadata":{}}]"#);

        assert_eq!(reply.sources.len(), 2);
        assert_eq!(reply.sources[0].title.as_deref(), Some("Setup"));
        assert_eq!(reply.sources[1].link, "https://x.dev/b");
        assert_eq!(reply.sources[1].title, None);
    }

    #[test]
    fn unparseable_sources_are_dropped() {
        let reply = parse_reply("Answer text||not json");

        assert_eq!(reply.text, "Answer text");
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn empty_source_segment_is_fine() {
        let reply = parse_reply("Answer text||");

        assert_eq!(reply.text, "Answer text");
        assert!(reply.sources.is_empty());
    }

    #[test]
    fn rejected_error_mentions_status_and_body() {
        let err = AssistantError::Rejected { status: 502, body: "bad gateway".to_string() };

        assert_eq!(err.to_string(), "assistant API rejected the request with status 502: bad gateway");
    }
}
