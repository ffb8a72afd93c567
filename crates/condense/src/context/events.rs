//! Observable compaction events and their handlers.
//!
//! The [`Compactor`](super::Compactor) reports every decision through an
//! [`EventHandler`]. Summarizer failures are recoverable: they surface here
//! (and as [`SkipReason::SummarizerFailed`](super::SkipReason)) instead of
//! as errors.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` (the default) |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::accountant::{TokenCount, UsageSource};
use crate::context::budget::ContextUsage;
use crate::context::ledger::CompactionRecord;
use crate::context::summarizer::SummarizeError;
use tracing::{debug, info, warn};

/// Events emitted by the compactor during one `compact_if_needed` call.
#[derive(Debug)]
pub enum CompactionEvent<'a> {
    /// Usage was measured against the budget.
    UsageMeasured {
        count: TokenCount,
        usage: &'a ContextUsage,
    },
    /// Usage is below the trigger threshold.
    UnderThreshold { usage: &'a ContextUsage },
    /// Threshold reached, but the partition left nothing to summarize.
    NothingToCompact { message_count: usize },
    /// The summarizer is about to be called.
    Summarizing { compact_count: usize, retain_count: usize },
    /// The summarizer failed; the session is left unchanged.
    SummarizerFailed { error: &'a SummarizeError },
    /// A compaction completed and was recorded.
    Compacted { record: &'a CompactionRecord },
}

/// Handler for compaction events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        let _ = event;
    }
}

impl<H: EventHandler + ?Sized> EventHandler for &H {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        (**self).on_event(event);
    }
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        match event {
            CompactionEvent::UsageMeasured { count, usage } => {
                let source = match count.source {
                    UsageSource::Reported => "reported",
                    UsageSource::Estimated => "estimated",
                };
                debug!("{} [{source}]", usage.to_log_string());
            }
            CompactionEvent::UnderThreshold { usage } => {
                debug!(
                    "No compaction needed ({:.1}% of available)",
                    usage.usage_pct * 100.0
                );
            }
            CompactionEvent::NothingToCompact { message_count } => {
                info!(
                    "Over threshold but nothing to compact ({message_count} message(s), \
                     all retained)"
                );
            }
            CompactionEvent::Summarizing {
                compact_count,
                retain_count,
            } => {
                info!(
                    "Context compaction triggered: summarizing {compact_count} message(s), \
                     retaining {retain_count}"
                );
            }
            CompactionEvent::SummarizerFailed { error } => {
                warn!("Summarization failed: {error}. Continuing without compaction.");
            }
            CompactionEvent::Compacted { record } => {
                info!("Context compaction completed: {}", record.to_log_string());
            }
        }
    }
}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&CompactionEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &CompactionEvent<'_>) {
        (self.0)(event);
    }
}

/// Dispatches each event to every inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_metrics_handler);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &CompactionEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}
