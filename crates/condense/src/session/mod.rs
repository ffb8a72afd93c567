//! Sessions: persisted state, engine configuration, and the turn driver.
//!
//! - [`state`]: [`SessionState`] (messages + ledger) with atomic JSON save.
//! - [`config`]: [`EngineConfig`], the serde-loadable settings.
//! - [`driver`]: [`SessionDriver`], one async lock per session.

pub mod config;
pub mod driver;
pub mod state;

pub use config::EngineConfig;
pub use driver::SessionDriver;
pub use state::{SessionError, SessionState, TurnReport};
