//! Context-window compaction engine for LLM conversations.
//!
//! `condense` keeps a running conversation inside a model's fixed context
//! budget. On every turn boundary the session driver hands the current
//! message sequence to a [`Compactor`](context::Compactor), which:
//!
//! 1. measures usage with the [token accountant](context::accountant),
//! 2. asks the [budget policy](context::budget) whether to act,
//! 3. splits the sequence with the [window selector](context::selector),
//! 4. calls an external [`Summarizer`](context::Summarizer) on the compact set,
//! 5. stitches the summary back in and appends a
//!    [`CompactionRecord`](context::CompactionRecord) to the
//!    [`Ledger`](context::Ledger).
//!
//! # Getting started
//!
//! ```ignore
//! use condense::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenRouterClient::new(std::env::var("OPENROUTER_KEY")?)?;
//!     let summarizer = OpenRouterSummarizer::new(client, "anthropic/claude-sonnet-4");
//!     let compactor = Compactor::new(&summarizer).with_keep_recent(3);
//!
//!     let messages = vec![
//!         Message::system("You are a helpful coding assistant."),
//!         Message::human("Read src/main.rs and summarize it."),
//!     ];
//!     let outcome = compactor
//!         .compact_if_needed(&messages, &BudgetParams::default())
//!         .await?;
//!     println!("compacted: {}", outcome.compacted);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Accountant, budget policy, window selector, summarizer boundary, compactor, ledger, events |
//! | [`session`] | Session state and persistence, per-session turn serialization, config |
//! | [`api`] | OpenRouter chat-completions client used by the production summarizer |

pub mod api;
pub mod context;
pub mod prelude;
pub mod session;

pub use api::{ChatMessage, ChatRequest, OpenRouterClient};

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    Human,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "tool")]
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::Human => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool"),
        }
    }
}

/// One typed segment of a structured message body.
///
/// Only `text` counts towards token estimates; image or other binary
/// segments carry `text: None`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
        }
    }

    /// A segment with no textual payload (image, audio, ...).
    pub fn opaque(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: None,
        }
    }
}

/// Message body: either a plain string or a list of typed fragments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Fragments(Vec<Fragment>),
}

impl Content {
    /// Iterate over every textual piece of the body.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        let (single, many) = match self {
            Content::Text(s) => (Some(s.as_str()), None),
            Content::Fragments(frags) => (None, Some(frags.iter())),
        };
        single
            .into_iter()
            .chain(many.into_iter().flatten().filter_map(|f| f.text.as_deref()))
    }

    /// Concatenate all textual pieces, separated by newlines.
    pub fn joined_text(&self) -> String {
        self.text_segments().collect::<Vec<_>>().join("\n")
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// Token usage reported by the model alongside an assistant response.
///
/// Reported figures are cumulative for the whole request, so the newest one
/// covers the entire conversation up to that point.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl Usage {
    pub fn new(total_tokens: u64) -> Self {
        Self {
            total_tokens,
            ..Default::default()
        }
    }

    /// Total including cache sub-counts.
    pub fn reported_total(&self) -> u64 {
        self.total_tokens
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }
}

/// A tool call requested by an assistant message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Marks the synthetic summary message produced by a compaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactionMarker {
    /// Number of original messages the summary replaces.
    pub replaced: usize,
    /// Number of retained messages placed directly after the summary.
    pub retained_after: usize,
}

/// A message in the conversation.
///
/// Messages are owned by the session; the engine never mutates one in
/// place, it only builds new sequences out of clones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionMarker>,
}

impl Message {
    fn with_role(role: Role, content: Option<Content>) -> Self {
        Self {
            role,
            content,
            usage: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            compaction: None,
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    pub fn human(content: impl Into<Content>) -> Self {
        Self::with_role(Role::Human, Some(content.into()))
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::with_role(Role::Assistant, None)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(Role::ToolResult, Some(content.into()))
        }
    }

    /// Attach reported usage (builder style).
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::ToolResult
    }

    /// Whether this is a synthetic summary produced by a compaction.
    pub fn is_compaction_summary(&self) -> bool {
        self.compaction.is_some()
    }

    /// All textual content, or an empty string when there is none.
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(Content::joined_text)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.text(), "hello");

        let human = Message::human("world");
        assert_eq!(human.role, Role::Human);

        let tool = Message::tool_result("call-1", "result");
        assert_eq!(tool.role, Role::ToolResult);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));

        let call = Message::assistant_tool_calls(vec![ToolCall::new("call-1", "read_file", "{}")]);
        assert_eq!(call.role, Role::Assistant);
        assert!(call.content.is_none());
        assert_eq!(call.tool_calls.len(), 1);
    }

    #[test]
    fn roles_serialize_with_wire_names() {
        let json = serde_json::to_value(Message::human("hi")).unwrap();
        assert_eq!(json["role"], "user");
        let json = serde_json::to_value(Message::tool_result("c", "ok")).unwrap();
        assert_eq!(json["role"], "tool");
        assert!(json.get("usage").is_none());
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn content_deserializes_string_or_fragments() {
        let plain: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"plain"}"#).unwrap();
        assert_eq!(plain.content, Some(Content::Text("plain".into())));

        let frags: Message = serde_json::from_str(
            r#"{"role":"user","content":[{"type":"text","text":"a"},{"type":"image_url"}]}"#,
        )
        .unwrap();
        let Some(Content::Fragments(parts)) = frags.content else {
            panic!("expected fragments");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].text, None);
    }

    #[test]
    fn text_segments_skip_non_text_fragments() {
        let content = Content::Fragments(vec![
            Fragment::text("one"),
            Fragment::opaque("image_url"),
            Fragment::text("two"),
        ]);
        assert_eq!(content.joined_text(), "one\ntwo");
    }

    #[test]
    fn reported_total_includes_cache_counts() {
        let usage = Usage {
            total_tokens: 100,
            cache_creation_tokens: 20,
            cache_read_tokens: 5,
        };
        assert_eq!(usage.reported_total(), 125);
    }
}
