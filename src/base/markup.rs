//! Converts documentation markdown into Slack `mrkdwn`.
//!
//! The rewrite rules run in a fixed order. Strong emphasis is carried as a private-use
//! marker until the very end, so the italics rule never sees the asterisks produced by
//! the bold and heading rules. Code spans, fenced blocks and link targets are set aside
//! before any rule runs and restored verbatim afterwards.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Stand-in for Slack's `*` strong delimiter while the rules run.
const STRONG: char = '\u{E000}';
/// Delimits the index of a stashed span.
const STASH: char = '\u{E001}';

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("valid fenced code regex"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`\n]+`").expect("valid inline code regex"));
static STASHED: LazyLock<Regex> = LazyLock::new(|| Regex::new(&format!("{STASH}(\\d+){STASH}")).expect("valid stash regex"));

static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid bold regex"));
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__([^_\n]+?)__").expect("valid bold regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,3}[ \t]+(.+?)[ \t]*$").expect("valid heading regex"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)(?:[*-]|\d+\.)[ \t]+").expect("valid list regex"));
// Known limitation: Slack strong output in the middle of a line reads as markdown italics,
// so a second pass turns `Say *hello* now` into `Say _hello_ now`.
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([^\n*])\*([^*\s](?:[^*\n]*[^*\s])?)\*").expect("valid italic regex"));
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~\n]+?)~~").expect("valid strikethrough regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid link regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Transforms documentation markdown into Slack markup.
///
/// Total and side-effect free. Block quotes and code are left as they are.
pub fn transform(markdown: &str) -> String {
    let mut stash = Vec::new();

    // Fenced blocks lose their language tag; the fence and body survive untouched.
    let text = FENCED_CODE.replace_all(markdown, |caps: &Captures| stash_code(&mut stash, format!("```\n{}```", &caps[1])));
    let text = INLINE_CODE.replace_all(&text, |caps: &Captures| stash_code(&mut stash, caps[0].to_string()));
    // Link targets keep their underscores and asterisks; the link text still goes through every rule.
    let text = LINK.replace_all(&text, |caps: &Captures| format!("[{}]({})", &caps[1], stash_code(&mut stash, caps[2].to_string())));

    let text = BOLD_STARS.replace_all(&text, format!("{STRONG}${{1}}{STRONG}").as_str());
    let text = BOLD_UNDERSCORES.replace_all(&text, format!("{STRONG}${{1}}{STRONG}").as_str());
    let text = HEADING.replace_all(&text, |caps: &Captures| format!("{STRONG}{}{STRONG}", caps[1].replace(STRONG, "")));
    let text = LIST_MARKER.replace_all(&text, "${1}• ");
    let text = ITALIC.replace_all(&text, "${1}_${2}_");
    let text = STRIKETHROUGH.replace_all(&text, "~${1}~");
    let text = LINK.replace_all(&text, "<${2}|${1}>");
    let text = BLANK_LINES.replace_all(&text, "\n\n");

    let text = text.replace(STRONG, "*");

    STASHED
        .replace_all(&text, |caps: &Captures| {
            caps[1].parse::<usize>().ok().and_then(|index| stash.get(index)).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Sets a verbatim span aside and returns its placeholder.
fn stash_code(stash: &mut Vec<String>, code: String) -> String {
    stash.push(code);
    format!("{STASH}{}{STASH}", stash.len() - 1)
}

// Tests.
