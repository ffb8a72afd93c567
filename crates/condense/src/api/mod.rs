//! API interaction layer for the production summarizer.
//!
//! - [`client`]: [`OpenRouterClient`], a minimal async client for the
//!   OpenRouter chat completions endpoint. Errors are plain strings; the
//!   summarizer wraps them into
//!   [`SummarizeError::Transport`](crate::context::SummarizeError::Transport).

pub mod client;

pub use client::{
    ChatCompletion, ChatMessage, ChatRequest, DEFAULT_MODEL, OPENROUTER_URL, OpenRouterClient,
    UsageInfo,
};
