//! Per-session state and its on-disk form.
//!
//! A [`SessionState`] is the unit the driver swaps atomically: the message
//! sequence and the ledger move together, so a compaction is either fully
//! applied (new messages plus one more record) or not at all.

use crate::Message;
use crate::context::{
    BudgetParams, CompactionOutcome, CompactionRecord, Compactor, ConfigError, Ledger, SkipReason,
    Summarizer,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading, saving, or configuring a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Messages and compaction history of one conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub ledger: Ledger,
}

/// Accepted on-disk shapes: a full session, or a bare message array.
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    State(SessionState),
    Bare(Vec<Message>),
}

/// What one turn did to a session.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// The record appended to the ledger, if the turn compacted.
    pub record: Option<CompactionRecord>,
    pub skipped: Option<SkipReason>,
    /// Length of the message sequence after the turn.
    pub message_count: usize,
}

impl TurnReport {
    pub fn compacted(&self) -> bool {
        self.record.is_some()
    }
}

impl SessionState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ledger: Ledger::new(),
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Take the result of a compaction check.
    ///
    /// On success the messages are replaced and the record appended; any
    /// other outcome leaves the state as it was.
    #[must_use]
    pub fn apply(self, outcome: CompactionOutcome) -> (Self, TurnReport) {
        match outcome.record {
            Some(record) if outcome.compacted => {
                let report = TurnReport {
                    record: Some(record.clone()),
                    skipped: None,
                    message_count: outcome.messages.len(),
                };
                let state = Self {
                    messages: outcome.messages,
                    ledger: self.ledger.with_record(record),
                };
                (state, report)
            }
            _ => {
                let report = TurnReport {
                    record: None,
                    skipped: outcome.skipped,
                    message_count: self.messages.len(),
                };
                (self, report)
            }
        }
    }

    /// Run one compaction check and return the resulting state.
    pub async fn compact<S: Summarizer>(
        self,
        compactor: &Compactor<S>,
        params: &BudgetParams,
    ) -> Result<(Self, TurnReport), ConfigError> {
        let outcome = compactor.compact_if_needed(&self.messages, params).await?;
        Ok(self.apply(outcome))
    }

    /// Load a session file, or a bare JSON array of messages.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let json = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SessionFile = serde_json::from_str(&json).map_err(|source| SessionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(match file {
            SessionFile::State(state) => state,
            SessionFile::Bare(messages) => Self::new(messages),
        })
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let write_err = |source: std::io::Error| SessionError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }

        let file_name = path
            .file_name()
            .map_or_else(|| "session".into(), |n| n.to_string_lossy().into_owned());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, json).map_err(write_err)?;
        std::fs::rename(&tmp_path, path).map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn record() -> CompactionRecord {
        CompactionRecord {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            tokens_before: 1000,
            tokens_after: 100,
            messages_removed_count: 5,
            messages_kept_count: 3,
            summary_excerpt: "s".into(),
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let state = SessionState {
            messages: vec![Message::system("sys"), Message::human("hi")],
            ledger: Ledger::new().with_record(record()),
        };
        state.save(&path).unwrap();

        assert!(!dir.path().join("nested").join(".session.json.tmp").exists());
        assert_eq!(SessionState::load(&path).unwrap(), state);
    }

    #[test]
    fn loads_bare_message_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.json");
        std::fs::write(
            &path,
            r#"[{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]"#,
        )
        .unwrap();
        let state = SessionState::load(&path).unwrap();
        assert_eq!(state.messages.len(), 2);
        assert!(state.ledger.is_empty());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SessionState::load(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(matches!(err, SessionError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/session.json"));
    }

    #[test]
    fn garbage_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SessionState::load(&path).unwrap_err(),
            SessionError::Parse { .. }
        ));
    }

    #[test]
    fn apply_skipped_outcome_keeps_state() {
        let state = SessionState::new(vec![Message::human("hi")]);
        let outcome = CompactionOutcome {
            compacted: false,
            messages: state.messages.clone(),
            record: None,
            skipped: Some(SkipReason::UnderThreshold),
        };
        let (next, report) = state.clone().apply(outcome);
        assert_eq!(next, state);
        assert!(!report.compacted());
        assert_eq!(report.skipped, Some(SkipReason::UnderThreshold));
    }

    #[test]
    fn apply_compacted_outcome_appends_record() {
        let state = SessionState::new(vec![Message::human("a"), Message::human("b")]);
        let outcome = CompactionOutcome {
            compacted: true,
            messages: vec![Message::assistant("summary")],
            record: Some(record()),
            skipped: None,
        };
        let (next, report) = state.apply(outcome);
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.ledger.len(), 1);
        assert!(report.compacted());
        assert_eq!(report.message_count, 1);
    }
}
