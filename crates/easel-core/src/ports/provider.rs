//! GenerationClient port: the opaque provider that turns prompts into
//! artifacts.

use async_trait::async_trait;

use crate::domain::{GenerateError, Generation};

/// One generation call. The prompt arrives fully resolved (no placeholders
/// left); `options` is forwarded verbatim from the task.
///
/// Implementations own their transport concerns (timeouts, auth). The core
/// only cares about the error classification: quota exhaustion aborts the
/// run, everything else is a provider failure with a retryable flag.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &serde_json::Value,
    ) -> Result<Generation, GenerateError>;
}
