//! Subscription keys and task bookkeeping.

use crate::cancellation::CancellationToken;
use crate::core::TaskState;
use crate::errors::{Result, SubflowError};
use crate::utils::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Identity of one subscription within a runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Wraps a caller-chosen key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a fresh key of the form `<pipeline>-<uuid>`.
    #[must_use]
    pub fn generate(pipeline: &str) -> Self {
        Self(format!("{pipeline}-{}", crate::utils::generate_uuid()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SubscriptionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// What a pump task did before it ended normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpReport {
    /// Items pulled from the source.
    pub items_received: usize,
    /// Outputs accepted by the sink.
    pub items_delivered: usize,
}

/// A running pump and the handles needed to stop it.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) task_name: String,
    pub(crate) pipeline: String,
    pub(crate) token: CancellationToken,
    pub(crate) handle: JoinHandle<Result<PumpReport>>,
    pub(crate) state: Arc<Mutex<TaskState>>,
    pub(crate) started_at: Timestamp,
}

impl TaskRecord {
    /// True once the pump has produced its result, even if the task itself
    /// is still unwinding.
    pub(crate) fn is_finished(&self) -> bool {
        self.state.lock().is_terminal() || self.handle.is_finished()
    }
}

/// The classified result of a finished subscription.
#[derive(Debug)]
pub struct ReapOutcome {
    /// The subscription's key.
    pub key: SubscriptionKey,
    /// The pump task's name (`Subscription-<key>`).
    pub task_name: String,
    /// The terminal state.
    pub state: TaskState,
    /// Counters, for a normally completed task.
    pub report: Option<PumpReport>,
    /// The error, for a failed or cancelled task.
    pub error: Option<SubflowError>,
}

impl ReapOutcome {
    pub(crate) fn classify(
        key: SubscriptionKey,
        task_name: String,
        joined: std::result::Result<Result<PumpReport>, tokio::task::JoinError>,
    ) -> Self {
        let (state, report, error) = match joined {
            Ok(Ok(report)) => (TaskState::Completed, Some(report), None),
            Ok(Err(e)) if e.is_cancelled() => (TaskState::Cancelled, None, Some(e)),
            Ok(Err(e)) => (TaskState::Failed, None, Some(e)),
            Err(e) if e.is_cancelled() => (
                TaskState::Cancelled,
                None,
                Some(SubflowError::Cancelled(task_name.clone())),
            ),
            Err(e) => (
                TaskState::Failed,
                None,
                Some(SubflowError::TaskPanicked(panic_message(e))),
            ),
        };
        Self {
            key,
            task_name,
            state,
            report,
            error,
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;

    #[test]
    fn test_generated_keys_are_unique_and_prefixed() {
        let a = SubscriptionKey::generate("trending");
        let b = SubscriptionKey::generate("trending");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("trending-"));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(SubscriptionKey::from("watcher").to_string(), "watcher");
    }

    #[test]
    fn test_classify_completed_and_failed() {
        let report = PumpReport {
            items_received: 2,
            items_delivered: 2,
        };
        let done = ReapOutcome::classify("a".into(), "Subscription-a".into(), Ok(Ok(report)));
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(done.report, Some(report));

        let failed = ReapOutcome::classify(
            "b".into(),
            "Subscription-b".into(),
            Ok(Err(StageError::new("x", "boom").into())),
        );
        assert_eq!(failed.state, TaskState::Failed);
        assert_eq!(failed.error.map(|e| e.kind()), Some("stage"));

        let cancelled = ReapOutcome::classify(
            "c".into(),
            "Subscription-c".into(),
            Ok(Err(SubflowError::Cancelled("c".into()))),
        );
        assert_eq!(cancelled.state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn test_classify_panic() {
        let joined = tokio::spawn(async {
            if PumpReport::default().items_received == 0 {
                panic!("pump exploded");
            }
            Ok::<_, SubflowError>(PumpReport::default())
        })
        .await;

        let outcome = ReapOutcome::classify("p".into(), "Subscription-p".into(), joined);
        assert_eq!(outcome.state, TaskState::Failed);
        match outcome.error {
            Some(SubflowError::TaskPanicked(msg)) => assert_eq!(msg, "pump exploded"),
            other => panic!("expected TaskPanicked, got {other:?}"),
        }
    }
}
