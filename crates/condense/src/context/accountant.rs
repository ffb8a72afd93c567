//! Token accounting: how much of the context window a message sequence uses.
//!
//! Two sources, in priority order:
//!
//! 1. **Reported usage.** Scanning from the newest message backward, the first
//!    assistant message carrying a [`Usage`](crate::Usage) wins. Reported
//!    figures are cumulative per request, so the newest one already covers
//!    everything before it and the scan stops there.
//! 2. **Estimation.** With no trusted report, every textual segment is
//!    counted by character and divided by [`CHARS_PER_TOKEN`].
//!
//! Reports carried by messages that were retained across a compaction are
//! not trusted: they describe the pre-compaction conversation. Only reports
//! on messages appended after the retained span of the latest summary count.
//!
//! Accounting never fails. Missing or non-text content contributes zero.

use crate::{Message, Role};

/// Conservative characters-per-token ratio for mixed-language text.
pub const CHARS_PER_TOKEN: usize = 3;

/// Where a token figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSource {
    /// Taken from the newest trusted usage report.
    Reported,
    /// Estimated from character counts.
    Estimated,
}

/// A token count together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub tokens: u64,
    pub source: UsageSource,
}

/// Current usage of a message sequence.
pub fn usage(messages: &[Message]) -> u64 {
    measure(messages).tokens
}

/// Current usage of a message sequence, with provenance.
pub fn measure(messages: &[Message]) -> TokenCount {
    match reported_usage(messages) {
        Some(tokens) => TokenCount {
            tokens,
            source: UsageSource::Reported,
        },
        None => TokenCount {
            tokens: estimate_tokens(messages),
            source: UsageSource::Estimated,
        },
    }
}

/// Newest trusted usage report, if any.
pub fn reported_usage(messages: &[Message]) -> Option<u64> {
    let trusted_from = trusted_start(messages);
    messages[trusted_from..]
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| m.usage.map(|u| u.reported_total()))
}

/// Character-based estimate over every message.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let total_chars: usize = messages.iter().map(message_chars).sum();
    (total_chars / CHARS_PER_TOKEN) as u64
}

fn message_chars(msg: &Message) -> usize {
    msg.content
        .as_ref()
        .map_or(0, |c| c.text_segments().map(|s| s.chars().count()).sum())
}

/// First index whose usage report postdates the latest compaction.
fn trusted_start(messages: &[Message]) -> usize {
    messages
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, m)| {
            m.compaction
                .map(|c| i.saturating_add(1).saturating_add(c.retained_after))
        })
        .map_or(0, |start| start.min(messages.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompactionMarker, Content, Fragment, Usage};

    fn assistant_with_usage(text: &str, total: u64) -> Message {
        Message::assistant(text).with_usage(Usage::new(total))
    }

    #[test]
    fn newest_report_wins() {
        let messages = vec![
            Message::human("hi"),
            assistant_with_usage("a", 500),
            Message::human("more"),
            assistant_with_usage("b", 900),
            Message::human("latest"),
        ];
        let count = measure(&messages);
        assert_eq!(count.tokens, 900);
        assert_eq!(count.source, UsageSource::Reported);
    }

    #[test]
    fn report_includes_cache_tokens() {
        let messages = vec![Message::assistant("a").with_usage(Usage {
            total_tokens: 1000,
            cache_creation_tokens: 200,
            cache_read_tokens: 50,
        })];
        assert_eq!(usage(&messages), 1250);
    }

    #[test]
    fn usage_on_non_assistant_is_ignored() {
        let messages = vec![Message::human("x".repeat(30)).with_usage(Usage::new(10_000))];
        let count = measure(&messages);
        assert_eq!(count.source, UsageSource::Estimated);
        assert_eq!(count.tokens, 10);
    }

    #[test]
    fn estimates_three_chars_per_token() {
        let messages = vec![Message::human("a".repeat(300)), Message::assistant("b".repeat(301))];
        assert_eq!(estimate_tokens(&messages), 200);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        // Three CJK characters are nine bytes but one token at 3 chars/token.
        let messages = vec![Message::human("上下文")];
        assert_eq!(estimate_tokens(&messages), 1);
    }

    #[test]
    fn fragments_contribute_text_only() {
        let msg = Message::human(Content::Fragments(vec![
            Fragment::text("abc"),
            Fragment::opaque("image_url"),
            Fragment::text("def"),
        ]));
        assert_eq!(estimate_tokens(&[msg]), 2);
    }

    #[test]
    fn missing_content_counts_zero() {
        let call = Message::assistant_tool_calls(vec![]);
        assert_eq!(estimate_tokens(&[call]), 0);
        assert_eq!(usage(&[]), 0);
    }

    #[test]
    fn reports_in_retained_span_are_not_trusted() {
        let mut summary = Message::assistant("s".repeat(30));
        summary.compaction = Some(CompactionMarker {
            replaced: 8,
            retained_after: 2,
        });
        let messages = vec![
            Message::system("sys"),
            summary,
            Message::human("h".repeat(30)),
            assistant_with_usage(&"a".repeat(30), 95_000),
        ];
        let count = measure(&messages);
        assert_eq!(count.source, UsageSource::Estimated);
        assert_eq!(count.tokens, 31);
    }

    #[test]
    fn oversized_retained_span_from_disk_does_not_overflow() {
        let messages: Vec<Message> = serde_json::from_str(
            r#"[
                {"role": "assistant", "content": "s",
                 "compaction": {"replaced": 1, "retained_after": 18446744073709551615}},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "ok", "usage": {"total_tokens": 500}}
            ]"#,
        )
        .unwrap();
        let count = measure(&messages);
        assert_eq!(count.source, UsageSource::Estimated);
        assert_eq!(count.tokens, 1);
    }

    #[test]
    fn reports_after_retained_span_are_trusted() {
        let mut summary = Message::assistant("summary");
        summary.compaction = Some(CompactionMarker {
            replaced: 8,
            retained_after: 1,
        });
        let messages = vec![
            summary,
            assistant_with_usage("stale", 95_000),
            Message::human("next"),
            assistant_with_usage("fresh", 12_000),
        ];
        assert_eq!(reported_usage(&messages), Some(12_000));
    }
}
