//! Convenience re-exports for common `condense` types.
//!
//! Meant to be glob-imported:
//!
//! ```ignore
//! use condense::prelude::*;
//! ```
//!
//! Covers the message model, the [`Compactor`] and its budget, the
//! summarizer boundary, event handlers, and sessions. Lower-level pieces
//! (the accountant, partition internals, the wire types of the HTTP client)
//! live in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Content, Fragment, Message, OpenRouterClient, Role, ToolCall, Usage};

// ── Compaction ──────────────────────────────────────────────────────
pub use crate::context::{
    BudgetParams, CompactionOutcome, CompactionRecord, Compactor, ConfigError, ContextUsage,
    Ledger, SkipReason, WindowSelector,
};

// ── Summarizers ─────────────────────────────────────────────────────
pub use crate::context::{FnSummarizer, OpenRouterSummarizer, SummarizeError, Summarizer};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::context::{
    CompactionEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler,
};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::session::{EngineConfig, SessionDriver, SessionError, SessionState, TurnReport};
