//! Turn serialization across many sessions.
//!
//! Each session sits behind its own `tokio::sync::Mutex`, so turns of one
//! session run strictly one after another while different sessions never
//! wait on each other. The outer map lock is held only long enough to look
//! up or create a slot, never across an `.await`.
//!
//! A turn works on a copy of the state and writes it back only once the
//! compaction check has finished. Dropping the `run_turn` future part way
//! (a cancelled request, an outer timeout) leaves the stored session as it
//! was before the turn began.

use crate::Message;
use crate::context::{BudgetParams, Compactor, ConfigError, Summarizer};
use crate::session::state::{SessionState, TurnReport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

type Slot = Arc<AsyncMutex<SessionState>>;

/// Owns the compactor and every live session.
pub struct SessionDriver<S> {
    compactor: Compactor<S>,
    sessions: Mutex<HashMap<String, Slot>>,
}

impl<S: Summarizer> SessionDriver<S> {
    pub fn new(compactor: Compactor<S>) -> Self {
        Self {
            compactor,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn compactor(&self) -> &Compactor<S> {
        &self.compactor
    }

    /// Register `state` under `key`, replacing any existing session.
    pub fn insert(&self, key: impl Into<String>, state: SessionState) {
        self.lock_sessions()
            .insert(key.into(), Arc::new(AsyncMutex::new(state)));
    }

    /// Forget a session. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock_sessions().remove(key).is_some()
    }

    /// Keys of all known sessions, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_sessions().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of a session's current state, waiting for any turn in flight.
    pub async fn snapshot(&self, key: &str) -> Option<SessionState> {
        let slot = self.lock_sessions().get(key).cloned()?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    /// Append this turn's messages and run one compaction check.
    ///
    /// Unknown keys start a fresh session. On `Err` nothing is stored,
    /// including `new_messages`.
    pub async fn run_turn(
        &self,
        key: &str,
        new_messages: Vec<Message>,
        params: &BudgetParams,
    ) -> Result<TurnReport, ConfigError> {
        let slot = self.slot(key);
        let mut stored = slot.lock().await;

        let mut working = stored.clone();
        for message in new_messages {
            working.push_message(message);
        }
        let (next, report) = working.compact(&self.compactor, params).await?;

        debug!(
            "Session {key}: turn finished with {} message(s), compacted={}",
            report.message_count,
            report.compacted()
        );
        *stored = next;
        Ok(report)
    }

    fn slot(&self, key: &str) -> Slot {
        self.lock_sessions()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FnSummarizer, NoopHandler, SkipReason, SummarizeError};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn long_turn(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::human("q".repeat(400))
                } else {
                    Message::assistant("a".repeat(400))
                }
            })
            .collect()
    }

    fn instant_summarizer() -> impl Summarizer {
        FnSummarizer::new(|messages: Vec<Message>, _| async move {
            Ok::<_, SummarizeError>(format!("{} message(s) summarized", messages.len()))
        })
    }

    #[tokio::test]
    async fn run_turn_appends_and_compacts() {
        let driver =
            SessionDriver::new(Compactor::new(instant_summarizer()).with_event_handler(NoopHandler));
        let params = BudgetParams::new(1_000);

        let report = driver.run_turn("s1", long_turn(2), &params).await.unwrap();
        assert!(!report.compacted());
        assert_eq!(report.skipped, Some(SkipReason::UnderThreshold));

        let report = driver.run_turn("s1", long_turn(8), &params).await.unwrap();
        assert!(report.compacted());
        let state = driver.snapshot("s1").await.unwrap();
        assert_eq!(state.ledger.len(), 1);
        assert_eq!(state.messages.len(), report.message_count);
        assert!(state.messages[0].is_compaction_summary());
    }

    #[tokio::test]
    async fn config_error_stores_nothing() {
        let driver = SessionDriver::new(Compactor::new(instant_summarizer()));
        driver.insert("s1", SessionState::new(vec![Message::human("hi")]));
        let bad = BudgetParams::new(100).with_threshold_ratio(0.0);
        assert!(driver.run_turn("s1", long_turn(2), &bad).await.is_err());
        assert_eq!(driver.snapshot("s1").await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_turn_leaves_session_untouched() {
        let summarizer = FnSummarizer::new(|_, _| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<_, SummarizeError>("never".to_string())
        });
        let driver = SessionDriver::new(Compactor::new(summarizer));
        let before = SessionState::new(long_turn(10));
        driver.insert("s1", before.clone());

        let params = BudgetParams::new(1_000);
        let turn = driver.run_turn("s1", vec![Message::human("more")], &params);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), turn)
                .await
                .is_err()
        );
        assert_eq!(driver.snapshot("s1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn turns_on_one_session_are_serialized() {
        let driver = Arc::new(SessionDriver::new(Compactor::new(instant_summarizer())));
        let params = BudgetParams::default();
        let mut handles = Vec::new();
        for i in 0..10 {
            let driver = driver.clone();
            handles.push(tokio::spawn(async move {
                driver
                    .run_turn("shared", vec![Message::human(format!("m{i}"))], &params)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(driver.snapshot("shared").await.unwrap().messages.len(), 10);
    }

    #[tokio::test]
    async fn sessions_do_not_block_each_other() {
        let gate = Arc::new(Notify::new());
        let summarizer_gate = gate.clone();
        let summarizer = FnSummarizer::new(move |_, _| {
            let gate = summarizer_gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, SummarizeError>("released".to_string())
            }
        });
        let driver = Arc::new(SessionDriver::new(Compactor::new(summarizer)));
        let params = BudgetParams::new(1_000);

        let slow = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run_turn("slow", long_turn(10), &params).await })
        };
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(
            Duration::from_secs(5),
            driver.run_turn("fast", vec![Message::human("hi")], &params),
        )
        .await
        .expect("fast session blocked by slow one")
        .unwrap();
        assert!(!fast.compacted());

        gate.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert!(slow.compacted());
        assert_eq!(driver.keys(), vec!["fast".to_string(), "slow".to_string()]);
    }
}
