//! Change notifications pushed to the presentation layer.

use super::ids::TaskId;
use super::task::Task;

/// Emitted on every task mutation so a UI can reflect live status without
/// polling the store. Carried over a `tokio::sync::broadcast` channel; a
/// slow subscriber loses the oldest events, never the newest.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The task was created or changed state; carries the full snapshot.
    Updated(Task),

    /// The task was swept out of the local view.
    Removed(TaskId),
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Updated(task) => task.id,
            TaskEvent::Removed(id) => *id,
        }
    }
}
