//! TaskRepository port: the durable store for queue tasks.
//!
//! The store is the source of truth between process runs; the processor's
//! in-memory view is a cache written back on every transition. Cancellation
//! is a status update, so the port needs no delete.

use async_trait::async_trait;

use crate::domain::{RepositoryError, Task, TaskDraft};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// All stored tasks (used to hydrate the processor on startup).
    async fn list(&self) -> Result<Vec<Task>, RepositoryError>;

    /// Persist a draft. The store assigns id, insertion sequence, and
    /// creation time, and returns the materialized task.
    async fn insert(&self, draft: TaskDraft) -> Result<Task, RepositoryError>;

    /// Write back a full task snapshot. Returns false for an unknown id.
    async fn update(&self, task: &Task) -> Result<bool, RepositoryError>;
}
