//! Append-only history of compaction events.
//!
//! A [`CompactionRecord`] is created once per successful compaction and never
//! changed. The [`Ledger`] is a value: appending consumes the old ledger and
//! returns a new one, so concurrent sessions never share mutable history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters kept in [`CompactionRecord::summary_excerpt`].
pub const SUMMARY_EXCERPT_CHARS: usize = 240;

/// Outcome of one successful compaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CompactionRecord {
    pub timestamp: DateTime<Utc>,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub messages_removed_count: usize,
    pub messages_kept_count: usize,
    /// Leading part of the summary, for audit only.
    pub summary_excerpt: String,
}

impl CompactionRecord {
    /// Tokens freed by this compaction (zero if it grew the context).
    pub fn saved_tokens(&self) -> u64 {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    /// Percentage of `tokens_before` that was freed.
    pub fn reduction_pct(&self) -> f64 {
        if self.tokens_before == 0 {
            0.0
        } else {
            self.saved_tokens() as f64 / self.tokens_before as f64 * 100.0
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} -> {} tokens ({:.1}% saved), {} removed, {} kept",
            self.tokens_before,
            self.tokens_after,
            self.reduction_pct(),
            self.messages_removed_count,
            self.messages_kept_count,
        )
    }
}

/// Bound a summary to [`SUMMARY_EXCERPT_CHARS`] characters.
pub fn excerpt(summary: &str) -> String {
    let mut chars = summary.chars();
    let head: String = chars.by_ref().take(SUMMARY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Ordered, append-only sequence of compaction records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<CompactionRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The old ledger plus `record`.
    #[must_use]
    pub fn with_record(mut self, record: CompactionRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn records(&self) -> &[CompactionRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompactionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&CompactionRecord> {
        self.records.last()
    }

    pub fn total_saved_tokens(&self) -> u64 {
        self.records.iter().map(CompactionRecord::saved_tokens).sum()
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a CompactionRecord;
    type IntoIter = std::slice::Iter<'a, CompactionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(before: u64, after: u64) -> CompactionRecord {
        CompactionRecord {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            tokens_before: before,
            tokens_after: after,
            messages_removed_count: 7,
            messages_kept_count: 3,
            summary_excerpt: "summary".into(),
        }
    }

    #[test]
    fn with_record_appends_in_order() {
        let ledger = Ledger::new().with_record(record(1000, 200));
        let ledger = ledger.with_record(record(900, 300));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.records()[0].tokens_before, 1000);
        assert_eq!(ledger.latest().unwrap().tokens_before, 900);
        assert_eq!(ledger.total_saved_tokens(), 800 + 600);
    }

    #[test]
    fn appending_leaves_earlier_value_intact() {
        let base = Ledger::new().with_record(record(10, 5));
        let extended = base.clone().with_record(record(20, 5));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn reduction_stats() {
        let r = record(1000, 250);
        assert_eq!(r.saved_tokens(), 750);
        assert!((r.reduction_pct() - 75.0).abs() < 1e-9);
        assert_eq!(record(100, 150).saved_tokens(), 0);
        assert_eq!(record(0, 0).reduction_pct(), 0.0);
        assert!(r.to_log_string().contains("75.0% saved"));
    }

    #[test]
    fn excerpt_is_bounded_on_char_boundaries() {
        let short = excerpt("tiny");
        assert_eq!(short, "tiny");

        let long = "é".repeat(SUMMARY_EXCERPT_CHARS + 50);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), SUMMARY_EXCERPT_CHARS + 3);
        assert!(cut.ends_with("..."));

        let exact = "x".repeat(SUMMARY_EXCERPT_CHARS);
        assert_eq!(excerpt(&exact), exact);
    }

    #[test]
    fn ledger_serializes_as_array() {
        let ledger = Ledger::new().with_record(record(10, 5));
        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json.is_array());
        let back: Ledger = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
    }
}
