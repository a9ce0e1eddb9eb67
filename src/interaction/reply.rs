//! Rendering of the texts the relay posts back into a thread.

use crate::{
    base::markup,
    service::assistant::{AssistantReply, Citation},
};

/// Longest slice of a remote error body quoted back into the thread.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Longest slice of user text quoted in diagnostics.
const MAX_DIAGNOSTIC_TEXT_CHARS: usize = 300;

/// Diagnostics captured for a turn carrying the debug marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub channel_id: String,
    pub thread_ts: String,
    pub message_ts: String,
    pub store_key: String,
    pub session_id: String,
    pub history_folded: bool,
    pub raw_text: String,
    pub cleaned_text: String,
}

impl Diagnostics {
    /// Renders the diagnostics as a block of bullet lines.
    pub fn render(&self) -> String {
        [
            "*Debug info*".to_string(),
            format!("• Channel: `{}`", self.channel_id),
            format!("• Thread root: `{}`", self.thread_ts),
            format!("• Message: `{}`", self.message_ts),
            format!("• Store key: `{}`", self.store_key),
            format!("• Session: `{}`", self.session_id),
            format!("• Thread history folded: `{}`", self.history_folded),
            format!("• Raw text: `{}`", inline_code(&self.raw_text)),
            format!("• Cleaned text: `{}`", inline_code(&self.cleaned_text)),
        ]
        .join("\n")
    }
}

/// Resolves a citation link against the documentation site when it is not absolute.
pub fn resolve_link(docs_base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }

    format!("{}/{}", docs_base_url.trim_end_matches('/'), link.trim_start_matches('/'))
}

/// Renders a 1-indexed citation list where every index links to its source.
pub fn render_citations(docs_base_url: &str, sources: &[Citation]) -> String {
    let lines = sources.iter().enumerate().map(|(index, source)| {
        let link = resolve_link(docs_base_url, &source.link);

        match &source.title {
            Some(title) => format!("<{link}|[{}]> {title}", index + 1),
            None => format!("<{link}|[{}]>", index + 1),
        }
    });

    std::iter::once("*Sources:*".to_string()).chain(lines).collect::<Vec<_>>().join("\n")
}

/// Builds the full reply text for a successful turn.
pub fn render_reply(docs_base_url: &str, reply: &AssistantReply, diagnostics: Option<&Diagnostics>) -> String {
    let mut body = markup::transform(&reply.text);

    if !reply.sources.is_empty() {
        body.push_str("\n\n");
        body.push_str(&render_citations(docs_base_url, &reply.sources));
    }

    match diagnostics {
        Some(diagnostics) => format!("{}\n\n---\n\n{}", diagnostics.render(), body),
        None => body,
    }
}

/// Truncates text to `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let mut truncated = text.chars().take(max).collect::<String>();
    truncated.push('…');
    truncated
}

/// Truncates a remote error body for display.
pub fn truncate_error_body(body: &str) -> String {
    truncate(body.trim(), MAX_ERROR_BODY_CHARS)
}

/// Makes arbitrary text safe to show inside a single inline code span.
fn inline_code(text: &str) -> String {
    let flattened = text.replace('`', "'").split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&flattened, MAX_DIAGNOSTIC_TEXT_CHARS)
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS: &str = "https://docs.example.com";

    fn citation(link: &str, title: Option<&str>) -> Citation {
        Citation {
            link: link.to_string(),
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn relative_links_resolve_against_docs_site() {
        assert_eq!(resolve_link(DOCS, "a"), "https://docs.example.com/a");
        assert_eq!(resolve_link("https://docs.example.com/", "/guides/setup"), "https://docs.example.com/guides/setup");
        assert_eq!(resolve_link(DOCS, "https://other.dev/x"), "https://other.dev/x");
    }

    #[test]
    fn citations_are_one_indexed_links() {
        let rendered = render_citations(DOCS, &[citation("a", None), citation("b", Some("Bee"))]);

        assert_eq!(rendered, "*Sources:*\n<https://docs.example.com/a|[1]>\n<https://docs.example.com/b|[2]> Bee");
    }

    #[test]
    fn reply_is_transformed_and_followed_by_sources() {
        let reply = AssistantReply {
            text: "**Yes**, see below.".to_string(),
            sources: vec![citation("a", None)],
        };

        assert_eq!(render_reply(DOCS, &reply, None), "*Yes*, see below.\n\n*Sources:*\n<https://docs.example.com/a|[1]>");
    }

    #[test]
    fn reply_without_sources_has_no_source_block() {
        let reply = AssistantReply {
            text: "Plain answer".to_string(),
            sources: Vec::new(),
        };

        assert_eq!(render_reply(DOCS, &reply, None), "Plain answer");
    }

    #[test]
    fn diagnostics_come_first_behind_a_rule() {
        let diagnostics = Diagnostics {
            channel_id: "C1".to_string(),
            thread_ts: "1.1".to_string(),
            message_ts: "1.2".to_string(),
            store_key: "C1:1.1".to_string(),
            session_id: "topic-1".to_string(),
            history_folded: false,
            raw_text: "<@UBOT> [DEBUG] `why`\nnow".to_string(),
            cleaned_text: "'why' now".to_string(),
        };
        let reply = AssistantReply {
            text: "Because.".to_string(),
            sources: Vec::new(),
        };

        let rendered = render_reply(DOCS, &reply, Some(&diagnostics));

        assert!(rendered.starts_with("*Debug info*\n"));
        assert!(rendered.contains("• Store key: `C1:1.1`"));
        assert!(rendered.contains("• Raw text: `<@UBOT> [DEBUG] 'why' now`"));
        assert!(rendered.ends_with("\n\n---\n\nBecause."));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let truncated = truncate_error_body(&body);

        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 1);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_error_body(" short "), "short");
    }
}
