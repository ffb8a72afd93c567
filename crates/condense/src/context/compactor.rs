//! The compactor: measure, decide, partition, summarize, reassemble, record.
//!
//! [`Compactor::compact_if_needed`] is called once per turn boundary. The
//! steady state (under threshold) is cheap: one backward scan, no
//! summarizer call. When it does compact, the new sequence is
//!
//! ```text
//! [retained system messages] [summary] [retained tail, original order]
//! ```
//!
//! A summarizer failure, timeout, or cancellation never produces a partial
//! result: the input sequence comes back unchanged and the next turn simply
//! re-checks. Only invalid [`BudgetParams`] are reported as errors.

use crate::context::accountant;
use crate::context::budget::{BudgetParams, ConfigError, ContextUsage};
use crate::context::events::{CompactionEvent, EventHandler, LoggingHandler};
use crate::context::ledger::{CompactionRecord, excerpt};
use crate::context::selector::{DEFAULT_KEEP_RECENT, WindowSelector};
use crate::context::summarizer::{
    COMPACTION_INSTRUCTIONS, SummarizeError, Summarizer, format_summary, strip_analysis,
};
use crate::{CompactionMarker, Message};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single summarizer call.
pub const DEFAULT_SUMMARIZER_TIMEOUT: Duration = Duration::from_secs(120);

/// Why a call returned without compacting.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Usage is below the trigger threshold.
    UnderThreshold,
    /// The partition left no message to summarize, or only an earlier
    /// summary.
    NothingToCompact,
    /// The summarizer failed; retry on a later turn.
    SummarizerFailed(SummarizeError),
}

/// Result of one [`Compactor::compact_if_needed`] call.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub compacted: bool,
    /// The new sequence, or the input unchanged when nothing happened.
    pub messages: Vec<Message>,
    pub record: Option<CompactionRecord>,
    /// Set exactly when `compacted` is false.
    pub skipped: Option<SkipReason>,
}

impl CompactionOutcome {
    fn unchanged(messages: &[Message], reason: SkipReason) -> Self {
        Self {
            compacted: false,
            messages: messages.to_vec(),
            record: None,
            skipped: Some(reason),
        }
    }
}

/// Orchestrates one compaction decision per call.
///
/// # Example
///
/// ```ignore
/// let compactor = Compactor::new(summarizer)
///     .with_keep_recent(3)
///     .with_timeout(Duration::from_secs(60));
///
/// let outcome = compactor.compact_if_needed(&messages, &params).await?;
/// if let Some(record) = &outcome.record {
///     ledger = ledger.with_record(record.clone());
/// }
/// messages = outcome.messages;
/// ```
pub struct Compactor<S> {
    summarizer: S,
    selector: WindowSelector,
    timeout: Duration,
    clock: fn() -> DateTime<Utc>,
    handler: Arc<dyn EventHandler>,
}

impl<S: Summarizer> Compactor<S> {
    pub fn new(summarizer: S) -> Self {
        Self {
            summarizer,
            selector: WindowSelector::new(DEFAULT_KEEP_RECENT),
            timeout: DEFAULT_SUMMARIZER_TIMEOUT,
            clock: Utc::now,
            handler: Arc::new(LoggingHandler),
        }
    }

    /// Number of most recent messages kept verbatim.
    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.selector = WindowSelector::new(keep_recent);
        self
    }

    /// Bound on the summarizer call; an elapsed bound counts as a failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the timestamp source for records.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    pub fn selector(&self) -> &WindowSelector {
        &self.selector
    }

    pub fn summarizer(&self) -> &S {
        &self.summarizer
    }

    /// Compact `messages` if the budget policy says so.
    pub async fn compact_if_needed(
        &self,
        messages: &[Message],
        params: &BudgetParams,
    ) -> Result<CompactionOutcome, ConfigError> {
        params.validate()?;

        let count = accountant::measure(messages);
        let usage = ContextUsage::measure(count.tokens, params)?;
        self.handler.on_event(&CompactionEvent::UsageMeasured {
            count,
            usage: &usage,
        });
        if !usage.needs_compaction {
            self.handler
                .on_event(&CompactionEvent::UnderThreshold { usage: &usage });
            return Ok(CompactionOutcome::unchanged(
                messages,
                SkipReason::UnderThreshold,
            ));
        }

        let partition = self.selector.partition(messages);
        // A lone earlier summary outside the tail: summarizing it again frees nothing.
        let only_summaries = partition
            .compact
            .iter()
            .all(|&i| messages[i].is_compaction_summary());
        if partition.is_noop() || only_summaries {
            self.handler.on_event(&CompactionEvent::NothingToCompact {
                message_count: messages.len(),
            });
            return Ok(CompactionOutcome::unchanged(
                messages,
                SkipReason::NothingToCompact,
            ));
        }

        let compact_set = partition.compact_messages(messages);
        self.handler.on_event(&CompactionEvent::Summarizing {
            compact_count: compact_set.len(),
            retain_count: partition.retain.len(),
        });

        let summary = match self.summarize(&compact_set).await {
            Ok(summary) => summary,
            Err(error) => {
                self.handler
                    .on_event(&CompactionEvent::SummarizerFailed { error: &error });
                return Ok(CompactionOutcome::unchanged(
                    messages,
                    SkipReason::SummarizerFailed(error),
                ));
            }
        };

        let (system, tail): (Vec<&Message>, Vec<&Message>) = partition
            .retain
            .iter()
            .map(|&i| &messages[i])
            .partition(|m| m.is_system());

        let mut summary_message = Message::assistant(format_summary(&summary, compact_set.len()));
        summary_message.compaction = Some(CompactionMarker {
            replaced: compact_set.len(),
            retained_after: tail.len(),
        });

        let mut new_messages = Vec::with_capacity(partition.retain.len() + 1);
        new_messages.extend(system.into_iter().cloned());
        new_messages.push(summary_message);
        new_messages.extend(tail.into_iter().cloned());

        let record = CompactionRecord {
            timestamp: (self.clock)(),
            tokens_before: count.tokens,
            tokens_after: accountant::usage(&new_messages),
            messages_removed_count: compact_set.len(),
            messages_kept_count: partition.retain.len(),
            summary_excerpt: excerpt(&summary),
        };
        self.handler
            .on_event(&CompactionEvent::Compacted { record: &record });

        Ok(CompactionOutcome {
            compacted: true,
            messages: new_messages,
            record: Some(record),
            skipped: None,
        })
    }

    /// One bounded summarizer call, cleaned of any analysis scratchpad.
    async fn summarize(&self, compact_set: &[Message]) -> Result<String, SummarizeError> {
        let call = self
            .summarizer
            .summarize(compact_set, &COMPACTION_INSTRUCTIONS);
        let raw = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SummarizeError::Timeout(self.timeout))??;
        let summary = strip_analysis(&raw);
        if summary.is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(summary)
    }
}
