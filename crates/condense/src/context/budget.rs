//! Budget parameters and the compaction trigger policy.
//!
//! Compaction triggers once usage reaches `threshold_ratio` of the
//! *available* window, where available is `max_tokens` minus the headroom
//! reserved for the next response. A degenerate budget is a configuration
//! error reported to the caller, never silently corrected: a corrected
//! budget would hide a policy that can no longer fire.

use crate::Message;
use crate::context::accountant;
use serde::{Deserialize, Serialize};

/// Default context window in tokens.
pub const DEFAULT_MAX_TOKENS: u64 = 100_000;

/// Default headroom reserved for the model's next response.
pub const DEFAULT_RESERVED_OUTPUT_TOKENS: u64 = 4_096;

/// Default fraction of the available window at which compaction triggers.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.92;

/// Invalid budget configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    #[error(
        "reserved_output_tokens ({reserved}) must be less than max_tokens ({max}); \
         no tokens would be available for the conversation"
    )]
    ReserveExceedsWindow { reserved: u64, max: u64 },
    #[error("threshold_ratio must be in (0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("summarizer timeout must be greater than zero")]
    ZeroTimeout,
}

/// The context ceiling, reserved output headroom, and trigger threshold.
///
/// # Example
///
/// ```
/// use condense::context::BudgetParams;
///
/// let params = BudgetParams::new(8_000)
///     .with_reserved_output_tokens(1_000)
///     .with_threshold_ratio(0.9);
/// assert_eq!(params.available().unwrap(), 7_000);
/// assert!(params.should_compact(6_300).unwrap());
/// assert!(!params.should_compact(6_299).unwrap());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BudgetParams {
    /// Model context window in tokens.
    pub max_tokens: u64,
    /// Tokens reserved for the next response.
    pub reserved_output_tokens: u64,
    /// Fraction of available tokens above which compaction triggers.
    pub threshold_ratio: f64,
}

impl Default for BudgetParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
        }
    }
}

impl BudgetParams {
    /// A budget with the given window, no reserve, and the default threshold.
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            reserved_output_tokens: 0,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
        }
    }

    pub fn with_reserved_output_tokens(mut self, tokens: u64) -> Self {
        self.reserved_output_tokens = tokens;
        self
    }

    pub fn with_threshold_ratio(mut self, ratio: f64) -> Self {
        self.threshold_ratio = ratio;
        self
    }

    /// Check the budget invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        if self.reserved_output_tokens >= self.max_tokens {
            return Err(ConfigError::ReserveExceedsWindow {
                reserved: self.reserved_output_tokens,
                max: self.max_tokens,
            });
        }
        if !self.threshold_ratio.is_finite()
            || self.threshold_ratio <= 0.0
            || self.threshold_ratio > 1.0
        {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold_ratio));
        }
        Ok(())
    }

    /// Tokens available to the conversation: window minus output reserve.
    pub fn available(&self) -> Result<u64, ConfigError> {
        self.validate()?;
        Ok(self.max_tokens - self.reserved_output_tokens)
    }

    /// Whether `current_tokens` has reached the trigger threshold.
    pub fn should_compact(&self, current_tokens: u64) -> Result<bool, ConfigError> {
        should_compact(
            current_tokens,
            self.max_tokens,
            self.reserved_output_tokens,
            self.threshold_ratio,
        )
    }

    /// Smallest token count that triggers compaction.
    pub fn trigger_tokens(&self) -> Result<u64, ConfigError> {
        let available = self.available()?;
        let mut tokens = (available as f64 * self.threshold_ratio).ceil() as u64;
        // Float rounding can leave the product one off the comparison boundary.
        while tokens > 0 && self.should_compact(tokens - 1)? {
            tokens -= 1;
        }
        while !self.should_compact(tokens)? {
            tokens += 1;
        }
        Ok(tokens)
    }

    /// Snapshot the usage of `messages` against this budget.
    pub fn usage_of(&self, messages: &[Message]) -> Result<ContextUsage, ConfigError> {
        ContextUsage::measure(accountant::usage(messages), self)
    }
}

/// Decide whether compaction must run now.
///
/// Monotonic in `current_tokens`: if a count triggers, every larger count
/// triggers too.
pub fn should_compact(
    current_tokens: u64,
    max_tokens: u64,
    reserved_output_tokens: u64,
    threshold_ratio: f64,
) -> Result<bool, ConfigError> {
    let params = BudgetParams {
        max_tokens,
        reserved_output_tokens,
        threshold_ratio,
    };
    let available = params.available()?;
    Ok(current_tokens as f64 / available as f64 >= threshold_ratio)
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUsage {
    /// Tokens consumed.
    pub used: u64,
    /// Tokens available after the output reserve.
    pub available: u64,
    /// Full context window.
    pub max_tokens: u64,
    /// Usage as a fraction of `available` (0.0 to 1.0+).
    pub usage_pct: f64,
    /// Whether the budget policy would compact at this usage.
    pub needs_compaction: bool,
}

impl ContextUsage {
    pub fn measure(used: u64, params: &BudgetParams) -> Result<Self, ConfigError> {
        let available = params.available()?;
        Ok(Self {
            used,
            available,
            max_tokens: params.max_tokens,
            usage_pct: used as f64 / available as f64,
            needs_compaction: params.should_compact(used)?,
        })
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.1}% of {} available, window {})",
            self.used,
            self.usage_pct * 100.0,
            self.available,
            self.max_tokens,
        )
    }
}
