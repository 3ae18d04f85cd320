//! Task lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Pending (retryable failure, attempts left)
/// - Pending -> Processing -> Failed (non-retryable, quota, or attempts exhausted)
/// - Pending | Processing -> Cancelled (explicit cancel)
/// - Failed | Cancelled -> Pending (explicit requeue, attempts reset)
///
/// Terminal states are only left via requeue; in particular a late provider
/// result never overwrites Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked up.
    Pending,

    /// Currently executing a generation call.
    Processing,

    /// Generation succeeded; the result payload is set.
    Completed,

    /// Failed permanently (non-retryable, quota exhausted, or out of attempts).
    Failed,

    /// Cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no automatic transitions out)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Is this task eligible for pickup?
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
