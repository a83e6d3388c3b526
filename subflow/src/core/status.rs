//! Subscription task lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a subscription's pump task.
///
/// `Running` moves to exactly one of the terminal states. `Completed` and
/// `Failed` are observed by the supervisory loop when it reaps the task;
/// `Cancelled` follows an explicit unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// The pump is still pulling from its source.
    #[default]
    Running,
    /// The source was exhausted (or the item limit reached) without error.
    Completed,
    /// A stage or the sink raised, or the task panicked.
    Failed,
    /// The subscription was cancelled.
    Cancelled,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskState {
    /// Returns true if the task will not make further progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Returns true if the task ended with an error.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}
