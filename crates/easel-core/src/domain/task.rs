//! Task record: the unit of generation work.
//!
//! Design:
//! - One shape for both lifetimes: queue tasks are persisted through the
//!   repository, batch tasks live in a caller-owned list.
//! - This record is the single source of truth for task state; all
//!   transitions happen through methods here, never by poking fields.
//! - Transition methods applied to a terminal task are no-ops, which is what
//!   makes a cancel racing an in-flight generation safe: the late result is
//!   simply discarded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::GenerateError;
use super::generation::Generation;
use super::ids::TaskId;
use super::status::TaskStatus;

/// Default ceiling on execution attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What the caller hands over when creating a task. The store assigns
/// identity, sequence, and creation time on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub prompt: String,
    pub tokens: HashMap<String, String>,
    pub provider_options: serde_json::Value,
    pub priority: i32,
    pub max_attempts: u32,
}

impl TaskDraft {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tokens: HashMap::new(),
            provider_options: serde_json::Value::Null,
            priority: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_token(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.insert(name.into(), value.into());
        self
    }

    pub fn with_tokens(mut self, tokens: HashMap<String, String>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_provider_options(mut self, options: serde_json::Value) -> Self {
        self.provider_options = options;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// What happened to a task after a failed generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Returned to `Pending`; another attempt is allowed.
    Retried,

    /// Terminal `Failed`: non-retryable, or out of attempts.
    Failed,

    /// Terminal `Failed` because credits ran out; the caller must stop the
    /// whole run, not just this task.
    CircuitBroken,
}

/// One unit of generation work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Raw template; may contain `{{TOKEN}}` or `[TOKEN]` placeholders.
    pub prompt: String,
    pub tokens: HashMap<String, String>,

    /// Forwarded verbatim to the provider (model, size, style, ...).
    pub provider_options: serde_json::Value,

    /// Higher runs sooner; ties broken by `seq`.
    pub priority: i32,

    /// Insertion order, assigned by the store. FIFO tie-break within a
    /// priority band so equal-priority tasks cannot starve each other.
    pub seq: u64,

    pub status: TaskStatus,

    /// Attempts made so far, counting the in-flight one while `Processing`.
    pub attempts: u32,
    pub max_attempts: u32,

    /// Last failure, cleared on requeue.
    pub error_message: Option<String>,

    /// Set exactly when `Completed`.
    pub result: Option<Generation>,

    /// Earliest next pickup after a retryable failure (backoff).
    pub next_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Materialize a draft. Queue tasks get their identity from the
    /// repository; batch tasks use [`Task::ephemeral`].
    pub fn from_draft(draft: TaskDraft, id: TaskId, seq: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            prompt: draft.prompt,
            tokens: draft.tokens,
            provider_options: draft.provider_options,
            priority: draft.priority,
            seq,
            status: TaskStatus::Pending,
            attempts: 0,
            max_attempts: draft.max_attempts,
            error_message: None,
            result: None,
            next_run_at: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// An in-memory task for the batch runner; never touches a store.
    pub fn ephemeral(draft: TaskDraft) -> Self {
        Self::from_draft(draft, TaskId::generate(), 0, Utc::now())
    }

    /// Pickup: `Pending -> Processing`. Counts the attempt up front so the
    /// ceiling check after a failure sees the attempt that just ran.
    pub fn start_attempt(&mut self) {
        self.status = TaskStatus::Processing;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.next_run_at = None;
    }

    /// Success: `Processing -> Completed`. Discarded if the task reached a
    /// terminal state while the call was in flight.
    pub fn complete(&mut self, result: Generation) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error_message = None;
        self.completed_at = Some(Utc::now());
    }

    /// Terminal failure. Discarded against a terminal task (late result).
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error_message = Some(message.into());
    }

    /// Recoverable failure: back to `Pending` with attempts kept, eligible
    /// again at `retry_at`. Discarded against a terminal task.
    pub fn retry(&mut self, message: impl Into<String>, retry_at: Option<DateTime<Utc>>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Pending;
        self.error_message = Some(message.into());
        self.started_at = None;
        self.completed_at = None;
        self.next_run_at = retry_at;
    }

    /// Explicit cancel: terminal from `Pending` or `Processing`, no-op on an
    /// already-terminal task.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Cancelled;
    }

    /// Manual requeue: the only way out of `Failed`/`Cancelled`. Resets
    /// attempts and clears every per-run field.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
        self.attempts = 0;
        self.error_message = None;
        self.result = None;
        self.next_run_at = None;
        self.started_at = None;
        self.completed_at = None;
    }

    /// Apply the shared failure classification (quota aborts the run, the
    /// retryable flag plus remaining attempts decide retry vs terminal) and
    /// report what the caller must do about it.
    pub fn record_failure(
        &mut self,
        error: &GenerateError,
        retry_at: Option<DateTime<Utc>>,
    ) -> FailureOutcome {
        if error.is_circuit_breaking() {
            self.fail(error.to_string());
            return FailureOutcome::CircuitBroken;
        }
        if error.is_retryable() && self.attempts < self.max_attempts {
            self.retry(error.to_string(), retry_at);
            FailureOutcome::Retried
        } else {
            self.fail(error.to_string());
            FailureOutcome::Failed
        }
    }

    /// Eligible for pickup at `now`? Pending, and past any backoff deadline.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_runnable() && self.next_run_at.is_none_or(|at| at <= now)
    }
}
