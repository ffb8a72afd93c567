//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs the settings it
//! changes:
//!
//! ```ignore
//! let config = EngineConfig::load(Path::new("condense.json"))?
//!     .with_keep_recent(5)
//!     .with_timeout_secs(60);
//! config.validate()?;
//! let compactor = config.compactor(summarizer);
//! ```

use crate::api::DEFAULT_MODEL;
use crate::context::budget::{
    DEFAULT_MAX_TOKENS, DEFAULT_RESERVED_OUTPUT_TOKENS, DEFAULT_THRESHOLD_RATIO,
};
use crate::context::{
    BudgetParams, Compactor, ConfigError, DEFAULT_KEEP_RECENT, DEFAULT_SUMMARIZER_TIMEOUT,
    Summarizer, SummarizerConfig,
};
use crate::session::SessionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Budget, selection, and summarizer settings for one engine instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_tokens: u64,
    pub reserved_output_tokens: u64,
    pub threshold_ratio: f64,
    /// Most recent messages kept verbatim.
    pub keep_recent: usize,
    /// Model used for summarization calls.
    pub model: String,
    /// Bound on one summarizer call, in seconds.
    pub timeout_secs: u64,
    pub max_summary_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            keep_recent: DEFAULT_KEEP_RECENT,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_SUMMARIZER_TIMEOUT.as_secs(),
            max_summary_tokens: SummarizerConfig::default().max_summary_tokens,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let json = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SessionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_reserved_output_tokens(mut self, tokens: u64) -> Self {
        self.reserved_output_tokens = tokens;
        self
    }

    pub fn with_threshold_ratio(mut self, ratio: f64) -> Self {
        self.threshold_ratio = ratio;
        self
    }

    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_summary_tokens(mut self, tokens: u32) -> Self {
        self.max_summary_tokens = tokens;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.budget().validate()?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn budget(&self) -> BudgetParams {
        BudgetParams {
            max_tokens: self.max_tokens,
            reserved_output_tokens: self.reserved_output_tokens,
            threshold_ratio: self.threshold_ratio,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn summarizer_config(&self) -> SummarizerConfig {
        SummarizerConfig {
            model: self.model.clone(),
            max_summary_tokens: self.max_summary_tokens,
            ..Default::default()
        }
    }

    /// A compactor wired with this configuration's selection and timeout.
    pub fn compactor<S: Summarizer>(&self, summarizer: S) -> Compactor<S> {
        Compactor::new(summarizer)
            .with_keep_recent(self.keep_recent)
            .with_timeout(self.timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.budget(), BudgetParams::default());
        assert_eq!(config.keep_recent, 3);
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_tokens": 8000, "keep_recent": 5}"#).unwrap();
        assert_eq!(config.max_tokens, 8000);
        assert_eq!(config.keep_recent, 5);
        assert_eq!(config.reserved_output_tokens, DEFAULT_RESERVED_OUTPUT_TOKENS);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let config = EngineConfig::default().with_max_tokens(1000).with_reserved_output_tokens(2000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReserveExceedsWindow { .. })
        ));
        let config = EngineConfig::default().with_timeout_secs(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
        let config = EngineConfig::default().with_threshold_ratio(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("condense.json");
        std::fs::write(&path, r#"{"model": "test/model", "timeout_secs": 30}"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.model, "test/model");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.summarizer_config().model, "test/model");
    }
}
