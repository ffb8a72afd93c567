//! The summarization boundary: the prompt contract and the [`Summarizer`] trait.
//!
//! The compactor sends the compact set to a [`Summarizer`] together with
//! [`COMPACTION_INSTRUCTIONS`], a fixed system prompt asking for the
//! sections listed in [`SUMMARY_SECTIONS`]. Call sites never re-derive the
//! taxonomy; they pass the constant.
//!
//! A summarizer is invoked at most once per compaction attempt and must not
//! retry internally. Retry policy belongs to the session driver.

use crate::Message;
use crate::api::{ChatMessage, ChatRequest, OpenRouterClient};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sections the summary must contain, in order.
pub const SUMMARY_SECTIONS: [(&str, &str); 9] = [
    (
        "Primary Request and Intent",
        "Capture all of the user's explicit requests and intents in detail.",
    ),
    (
        "Key Technical Concepts",
        "List all important technical concepts, technologies, and frameworks discussed.",
    ),
    (
        "Files and Code Sections",
        "Enumerate specific files and code sections examined, modified, or created. \
         Pay special attention to the most recent messages and include full code snippets where applicable.",
    ),
    (
        "Errors and Fixes",
        "List all errors encountered and how they were fixed. Pay special attention to user feedback.",
    ),
    (
        "Problem Solving",
        "Document problems solved and any ongoing troubleshooting efforts.",
    ),
    (
        "All User Messages",
        "List all user messages that are not tool results.",
    ),
    (
        "Pending Tasks",
        "Outline any pending tasks you have explicitly been asked to work on.",
    ),
    (
        "Current Work",
        "Describe precisely what was being worked on immediately before this summary request.",
    ),
    (
        "Optional Next Step",
        "State the next step directly related to the most recent work.",
    ),
];

const COMPACTION_PREAMBLE: &str = "\
You are a specialized assistant for conversation summarization. Your task is to create a \
detailed summary of the conversation so far, paying close attention to the user's explicit \
requests and the assistant's previous actions. The summary must capture technical details, \
code patterns, and architectural decisions needed to continue the work without losing context.

Before the final summary, wrap your analysis in <analysis> tags to organize your thoughts.

Your summary must include the following sections:";

/// Fixed system instructions sent with every compaction request.
pub static COMPACTION_INSTRUCTIONS: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
    let mut prompt = String::from(COMPACTION_PREAMBLE);
    for (i, (title, guidance)) in SUMMARY_SECTIONS.iter().enumerate() {
        prompt.push_str(&format!("\n\n{}. **{title}**: {guidance}", i + 1));
    }
    prompt
});

/// Header of every synthetic summary message.
pub const SUMMARY_HEADER: &str = "# Conversation Summary (Context Compaction)";

/// Why a summarization attempt produced no usable summary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarizer transport error: {0}")]
    Transport(String),
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
    #[error("summarizer returned an empty summary")]
    Empty,
    #[error("summarizer returned a malformed response: {0}")]
    Malformed(String),
}

/// Boxed future returned by [`Summarizer::summarize`].
pub type SummarizeFuture<'a> = BoxFuture<'a, Result<String, SummarizeError>>;

/// External capability that condenses a message sequence into text.
///
/// Uses a boxed future so the trait stays dyn-compatible.
pub trait Summarizer: Send + Sync {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        system_instructions: &'a str,
    ) -> SummarizeFuture<'a>;
}

impl<S: Summarizer + ?Sized> Summarizer for &S {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        system_instructions: &'a str,
    ) -> SummarizeFuture<'a> {
        (**self).summarize(messages, system_instructions)
    }
}

impl<S: Summarizer + ?Sized> Summarizer for Arc<S> {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        system_instructions: &'a str,
    ) -> SummarizeFuture<'a> {
        (**self).summarize(messages, system_instructions)
    }
}

/// Render messages as a `[role]: text` transcript for the summarizer.
///
/// Full content is kept; tool calls are listed by name and arguments so the
/// summary can mention what was invoked. Tool results are tagged with their
/// call id (`[tool c1]: ...`).
pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let text = msg.text();
        let body = if text.is_empty() { "[no content]" } else { text.as_str() };
        match &msg.tool_call_id {
            Some(id) => out.push_str(&format!("[{} {id}]: {body}\n", msg.role)),
            None => out.push_str(&format!("[{}]: {body}\n", msg.role)),
        }
        for call in &msg.tool_calls {
            out.push_str(&format!("  -> {}({})\n", call.name, call.arguments));
        }
        out.push('\n');
    }
    out
}

/// Drop any `<analysis>...</analysis>` scratchpad from a summary.
pub fn strip_analysis(summary: &str) -> String {
    let mut out = String::new();
    let mut rest = summary;
    while let Some((before, after)) = rest.split_once("<analysis>") {
        out.push_str(before);
        rest = after.split_once("</analysis>").map_or("", |(_, tail)| tail);
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Text of the synthetic summary message.
pub fn format_summary(summary: &str, replaced: usize) -> String {
    format!(
        "{SUMMARY_HEADER}\n\nThe following summary replaces {replaced} earlier message(s) \
         to manage context length:\n\n{summary}"
    )
}

// ── OpenRouter ─────────────────────────────────────────────────────

/// Configuration for the OpenRouter-backed summarizer.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Model used for summarization.
    pub model: String,
    /// Maximum tokens for the summarization response.
    pub max_summary_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: crate::api::DEFAULT_MODEL.to_string(),
            max_summary_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// Production summarizer: one chat-completion call per attempt.
pub struct OpenRouterSummarizer {
    client: OpenRouterClient,
    config: SummarizerConfig,
}

impl OpenRouterSummarizer {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            config: SummarizerConfig {
                model: model.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_config(client: OpenRouterClient, config: SummarizerConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Build the one-shot request for a span of messages.
    pub fn build_request(&self, messages: &[Message], system_instructions: &str) -> ChatRequest {
        let mut user = render_transcript(messages);
        user.push_str(
            "Summarize the conversation above following the required sections. \
             Use <analysis> tags for your reasoning before the final summary.",
        );
        ChatRequest {
            model: Some(self.config.model.clone()),
            messages: vec![
                ChatMessage::system(system_instructions),
                ChatMessage::user(user),
            ],
            max_tokens: self.config.max_summary_tokens,
            temperature: self.config.temperature,
        }
    }
}

impl Summarizer for OpenRouterSummarizer {
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        system_instructions: &'a str,
    ) -> SummarizeFuture<'a> {
        Box::pin(async move {
            let request = self.build_request(messages, system_instructions);
            debug!(
                "Summarizing {} message(s) with {}",
                messages.len(),
                self.config.model
            );
            let completion = self
                .client
                .chat(&request)
                .await
                .map_err(SummarizeError::Transport)?;
            let content = completion.content.ok_or_else(|| {
                SummarizeError::Malformed(format!(
                    "no content (finish_reason={})",
                    completion.finish_reason.as_deref().unwrap_or("none")
                ))
            })?;
            if content.trim().is_empty() {
                return Err(SummarizeError::Empty);
            }
            Ok(content)
        })
    }
}

// ── Closure adapter ────────────────────────────────────────────────

/// A summarizer backed by a closure.
///
/// The closure receives owned copies of the messages and instructions.
///
/// ```ignore
/// let summarizer = FnSummarizer::new(|messages, _instructions| async move {
///     Ok(format!("{} messages about the build", messages.len()))
/// });
/// ```
pub struct FnSummarizer<F>(F);

impl<F, Fut> FnSummarizer<F>
where
    F: Fn(Vec<Message>, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SummarizeError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut> Summarizer for FnSummarizer<F>
where
    F: Fn(Vec<Message>, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, SummarizeError>> + Send + 'static,
{
    fn summarize<'a>(
        &'a self,
        messages: &'a [Message],
        system_instructions: &'a str,
    ) -> SummarizeFuture<'a> {
        Box::pin((self.0)(messages.to_vec(), system_instructions.to_string()))
    }
}
