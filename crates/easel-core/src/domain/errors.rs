//! Error taxonomy.
//!
//! Two failure kinds cross the provider boundary ([`GenerateError`]); the
//! queue's own mutating calls surface [`QueueError`] synchronously. Using a
//! tagged enum for the provider side makes the retry/abort classification
//! exhaustive at compile time.

use thiserror::Error;

use super::ids::TaskId;

/// Failure reported by the generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// The caller has no generation credits left. Never retried: another
    /// attempt is guaranteed to fail and wastes a request. Aborts the whole
    /// run (queue pauses itself, batch workers stop claiming).
    #[error("generation credits exhausted (remaining={remaining})")]
    QuotaExhausted { remaining: u32 },

    /// A provider or transport error. Client implementations map anything
    /// that is not a quota failure into this variant; errors they cannot
    /// classify get `retryable: false`.
    #[error("generation failed: {message}")]
    Provider {
        message: String,
        status_code: Option<u16>,
        retryable: bool,
    },
}

impl GenerateError {
    /// Is another attempt worth scheduling? Quota exhaustion never is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerateError::Provider { retryable: true, .. })
    }

    /// Does this failure abort the whole run rather than just this task?
    pub fn is_circuit_breaking(&self) -> bool {
        matches!(self, GenerateError::QuotaExhausted { .. })
    }
}

/// Failure from the durable task store.
#[derive(Debug, Clone, Error)]
#[error("repository failure: {0}")]
pub struct RepositoryError(pub String);

/// Error returned synchronously from a queue mutating call
/// (enqueue / cancel / requeue).
#[derive(Debug, Error)]
pub enum QueueError {
    /// The prompt resolves to an empty string after token substitution.
    #[error("prompt resolves to empty")]
    EmptyPrompt,

    /// The operation referenced a task id the queue does not know.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_never_retryable() {
        let err = GenerateError::QuotaExhausted { remaining: 0 };
        assert!(!err.is_retryable());
        assert!(err.is_circuit_breaking());
    }

    #[test]
    fn provider_errors_respect_the_retryable_flag() {
        let transient = GenerateError::Provider {
            message: "503 from upstream".into(),
            status_code: Some(503),
            retryable: true,
        };
        let permanent = GenerateError::Provider {
            message: "prompt rejected".into(),
            status_code: Some(400),
            retryable: false,
        };

        assert!(transient.is_retryable());
        assert!(!transient.is_circuit_breaking());
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn messages_carry_the_quota_balance() {
        let err = GenerateError::QuotaExhausted { remaining: 0 };
        assert!(err.to_string().contains("remaining=0"));
    }
}
