//! Aggregate counts over the current task set, for observability.

use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskStatus};

/// Snapshot of the queue by status. Recomputed from the task set on demand;
/// never stored, so it cannot drift from the tasks themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn project<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut stats = QueueStats::default();
        for task in tasks {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Nothing left to drain and nothing in flight.
    pub fn is_quiescent(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Generation, TaskDraft};

    #[test]
    fn projects_counts_by_status() {
        let mut completed = Task::ephemeral(TaskDraft::new("a"));
        completed.start_attempt();
        completed.complete(Generation::new("https://cdn/a.png", "gen-a"));

        let mut failed = Task::ephemeral(TaskDraft::new("b"));
        failed.start_attempt();
        failed.fail("boom");

        let pending = Task::ephemeral(TaskDraft::new("c"));

        let stats = QueueStats::project([&completed, &failed, &pending]);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert!(!stats.is_quiescent());
    }

    #[test]
    fn empty_set_is_quiescent() {
        assert!(QueueStats::project(std::iter::empty::<&Task>()).is_quiescent());
    }
}
