//! In-memory task repository.
//!
//! Stands in for the durable store in tests and the demo binary. Mirrors
//! the contract an embedded database would give us: insert assigns id,
//! insertion sequence, and creation time; update is a full-row write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{RepositoryError, Task, TaskDraft, TaskId};
use crate::ports::TaskRepository;

struct RepoState {
    rows: HashMap<TaskId, Task>,
    next_seq: u64,
}

pub struct InMemoryRepository {
    state: Arc<Mutex<RepoState>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RepoState {
                rows: HashMap::new(),
                next_seq: 1,
            })),
        }
    }

    /// Number of stored rows (terminal rows included; the store never
    /// forgets a task the queue has swept from its local view).
    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.rows.is_empty()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.rows.values().cloned().collect();
        tasks.sort_by_key(|t| t.seq);
        Ok(tasks)
    }

    async fn insert(&self, draft: TaskDraft) -> Result<Task, RepositoryError> {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;

        let task = Task::from_draft(draft, TaskId::generate(), seq, Utc::now());
        state.rows.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.rows.contains_key(&task.id) {
            return Ok(false);
        }
        state.rows.insert(task.id, task.clone());
        Ok(true)
    }
}
