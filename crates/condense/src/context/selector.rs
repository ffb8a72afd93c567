//! Window selection: which messages stay verbatim and which get summarized.
//!
//! The partition is positional and pure. Given an ordered sequence it yields
//! two index lists over the original positions:
//!
//! - **retain**: every `system` message wherever it sits, plus the most
//!   recent `keep_recent` messages (the tail);
//! - **compact**: everything else, in original order.
//!
//! The tail boundary is widened so a tool result is never separated from
//! the assistant message that requested it. If the message just before the
//! tail is a tool result it joins the tail, and while the tail starts with
//! a tool result the boundary keeps moving back until it reaches the
//! requesting assistant message.

use crate::Message;

/// Default number of most recent messages kept verbatim.
pub const DEFAULT_KEEP_RECENT: usize = 3;

/// Partition of a message sequence into compact and retain sets.
///
/// Both lists hold indices into the sequence that was partitioned, in
/// ascending order. Every index appears in exactly one list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub compact: Vec<usize>,
    pub retain: Vec<usize>,
    /// Index where the retained tail starts.
    pub tail_start: usize,
}

impl Partition {
    /// Nothing to summarize: compaction would be a no-op.
    pub fn is_noop(&self) -> bool {
        self.compact.is_empty()
    }

    /// Clone out the compact set in original order.
    pub fn compact_messages(&self, messages: &[Message]) -> Vec<Message> {
        self.compact.iter().map(|&i| messages[i].clone()).collect()
    }

    /// Clone out the retain set in original order.
    pub fn retain_messages(&self, messages: &[Message]) -> Vec<Message> {
        self.retain.iter().map(|&i| messages[i].clone()).collect()
    }
}

/// Positional window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSelector {
    keep_recent: usize,
}

impl Default for WindowSelector {
    fn default() -> Self {
        Self {
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

impl WindowSelector {
    pub fn new(keep_recent: usize) -> Self {
        Self { keep_recent }
    }

    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }

    /// Split `messages` into compact and retain sets.
    pub fn partition(&self, messages: &[Message]) -> Partition {
        let len = messages.len();
        if len <= self.keep_recent {
            return Partition {
                compact: Vec::new(),
                retain: (0..len).collect(),
                tail_start: 0,
            };
        }

        let tail_start = self.tail_start(messages);
        let (retain, compact): (Vec<usize>, Vec<usize>) =
            (0..len).partition(|&i| i >= tail_start || messages[i].is_system());
        Partition {
            compact,
            retain,
            tail_start,
        }
    }

    fn tail_start(&self, messages: &[Message]) -> usize {
        let mut start = messages.len() - self.keep_recent;
        if start > 0 && messages[start - 1].is_tool_result() {
            start -= 1;
        }
        while start > 0 && messages.get(start).is_some_and(Message::is_tool_result) {
            start -= 1;
        }
        start
    }
}

/// Partition with the given `keep_recent`.
pub fn partition(messages: &[Message], keep_recent: usize) -> Partition {
    WindowSelector::new(keep_recent).partition(messages)
}
