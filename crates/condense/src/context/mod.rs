//! Context compaction: accounting, policy, selection, summarization, history.
//!
//! A conversation grows until it no longer fits the model's window. This
//! module keeps it inside the budget by replacing older messages with a
//! single structured summary while the recent tail stays verbatim.
//!
//! 1. **[`accountant`]**: how many tokens the sequence uses, from the newest
//!    trusted usage report or a 3-chars-per-token estimate.
//!
//! 2. **[`budget`]**: [`BudgetParams`] and the trigger policy. Compaction
//!    fires at `threshold_ratio` of `max_tokens - reserved_output_tokens`.
//!
//! 3. **[`selector`]**: splits the sequence into a compact set and a retain
//!    set. System messages and tool call/result pairs are never split off.
//!
//! 4. **[`summarizer`]**: the [`Summarizer`] trait, the nine-section prompt
//!    contract, and the OpenRouter-backed implementation.
//!
//! 5. **[`compactor`]**: [`Compactor::compact_if_needed`] ties the above
//!    together and produces a [`CompactionRecord`].
//!
//! 6. **[`ledger`]**: the append-only [`Ledger`] of records.
//!
//! Every decision is reported through [`events`].

pub mod accountant;
pub mod budget;
pub mod compactor;
pub mod events;
pub mod ledger;
pub mod selector;
pub mod summarizer;

pub use accountant::{TokenCount, UsageSource};
pub use budget::{BudgetParams, ConfigError, ContextUsage};
pub use compactor::{CompactionOutcome, Compactor, DEFAULT_SUMMARIZER_TIMEOUT, SkipReason};
pub use events::{
    CompactionEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler,
};
pub use ledger::{CompactionRecord, Ledger};
pub use selector::{DEFAULT_KEEP_RECENT, Partition, WindowSelector};
pub use summarizer::{
    COMPACTION_INSTRUCTIONS, FnSummarizer, OpenRouterSummarizer, SummarizeError, Summarizer,
    SummarizerConfig,
};
