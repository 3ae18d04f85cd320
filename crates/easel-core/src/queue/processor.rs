//! Single-flight queue processor.
//!
//! Drains one pending task at a time from the repository-backed queue:
//! pick the highest-priority due task (FIFO within a band), resolve its
//! prompt template, call the provider, apply the outcome, repeat. Draining
//! runs on a background loop woken by a `Notify` signaled on every state
//! mutation (plus a timer for the earliest backoff deadline), so there is
//! no fixed-interval polling.
//!
//! Design:
//! - The processor owns an in-memory cache of tasks; the repository is the
//!   source of truth and gets a full write-back on every transition.
//! - Mutating calls (enqueue / cancel / requeue) return synchronously; only
//!   the drain loop executes generations.
//! - The loop itself never crashes because one task failed: provider errors
//!   land in the task's `error_message`, and quota exhaustion pauses the
//!   queue instead of failing the remaining pending tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{
    FailureOutcome, QueueError, Task, TaskDraft, TaskEvent, TaskId, TaskStatus, prompt,
};
use crate::ports::{GenerationClient, TaskRepository};

use super::retry::RetryPolicy;
use super::stats::QueueStats;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Processor configuration.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Backoff between attempts of a retryable failure.
    pub retry: RetryPolicy,
}

impl QueueConfig {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct ProcessorState {
    tasks: HashMap<TaskId, Task>,
    paused: bool,
    /// The single in-flight task. Only the drain loop writes this.
    in_flight: Option<TaskId>,
}

/// Handle to the background drain loop.
pub struct DrainHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DrainHandle {
    /// Stop picking up new tasks. Does not abort an in-flight generation.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for the loop to finish its current task.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

/// The single-flight queue processor.
pub struct QueueProcessor {
    repository: Arc<dyn TaskRepository>,
    client: Arc<dyn GenerationClient>,
    config: QueueConfig,
    state: Mutex<ProcessorState>,
    notify: Notify,
    events: broadcast::Sender<TaskEvent>,
}

impl QueueProcessor {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        client: Arc<dyn GenerationClient>,
        config: QueueConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repository,
            client,
            config,
            state: Mutex::new(ProcessorState {
                tasks: HashMap::new(),
                paused: false,
                in_flight: None,
            }),
            notify: Notify::new(),
            events,
        }
    }

    /// Hydrate the local cache from the repository. Returns how many tasks
    /// were loaded.
    pub async fn load(&self) -> Result<usize, QueueError> {
        let stored = self.repository.list().await?;
        let count = stored.len();
        {
            let mut state = self.state.lock().await;
            for task in stored {
                state.tasks.insert(task.id, task);
            }
        }
        self.notify.notify_one();
        Ok(count)
    }

    /// Create a pending task, persist it, and wake the drain loop.
    ///
    /// Fails with [`QueueError::EmptyPrompt`] if the template resolves to an
    /// empty string after token substitution.
    pub async fn enqueue(&self, draft: TaskDraft) -> Result<Task, QueueError> {
        if prompt::resolves_to_empty(&draft.prompt, &draft.tokens) {
            return Err(QueueError::EmptyPrompt);
        }

        let task = self.repository.insert(draft).await?;
        {
            let mut state = self.state.lock().await;
            state.tasks.insert(task.id, task.clone());
        }
        debug!(task_id = %task.id, priority = task.priority, "enqueued");
        self.publish(TaskEvent::Updated(task.clone()));
        self.notify.notify_one();
        Ok(task)
    }

    /// Cancel a pending or processing task. No-op (not an error) if the
    /// task is already terminal; an in-flight generation is not aborted,
    /// its late result is discarded.
    pub async fn cancel(&self, id: TaskId) -> Result<Task, QueueError> {
        let task = {
            let mut state = self.state.lock().await;
            let task = state
                .tasks
                .get_mut(&id)
                .ok_or(QueueError::TaskNotFound(id))?;
            task.cancel();
            task.clone()
        };
        self.write_back(&task).await?;
        self.publish(TaskEvent::Updated(task.clone()));
        self.notify.notify_one();
        Ok(task)
    }

    /// Reset a task to pending with a clean slate (attempts, error, result,
    /// timestamps). The only way out of `Failed`/`Cancelled`. A task that is
    /// currently processing is left alone; cancel it first.
    pub async fn requeue(&self, id: TaskId) -> Result<Task, QueueError> {
        let task = {
            let mut state = self.state.lock().await;
            let task = state
                .tasks
                .get_mut(&id)
                .ok_or(QueueError::TaskNotFound(id))?;
            if task.status != TaskStatus::Processing {
                task.requeue();
            }
            task.clone()
        };
        self.write_back(&task).await?;
        self.publish(TaskEvent::Updated(task.clone()));
        self.notify.notify_one();
        Ok(task)
    }

    /// Toggle auto-draining. Pausing never touches the in-flight task.
    pub async fn set_paused(&self, paused: bool) {
        {
            let mut state = self.state.lock().await;
            state.paused = paused;
        }
        info!(paused, "queue pause toggled");
        if !paused {
            self.notify.notify_one();
        }
    }

    pub async fn is_paused(&self) -> bool {
        self.state.lock().await.paused
    }

    /// Sweep completed and cancelled tasks from the local view. The
    /// repository keeps its rows. Returns how many were removed.
    pub async fn remove_completed(&self) -> usize {
        let removed: Vec<TaskId> = {
            let mut state = self.state.lock().await;
            let ids: Vec<TaskId> = state
                .tasks
                .values()
                .filter(|t| {
                    matches!(t.status, TaskStatus::Completed | TaskStatus::Cancelled)
                })
                .map(|t| t.id)
                .collect();
            for id in &ids {
                state.tasks.remove(id);
            }
            ids
        };
        for id in &removed {
            self.publish(TaskEvent::Removed(*id));
        }
        removed.len()
    }

    /// Current snapshot of one task.
    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// All tasks in the local view, in insertion order.
    pub async fn tasks(&self) -> Vec<Task> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    /// Aggregate counts over the local view.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats::project(state.tasks.values())
    }

    /// Subscribe to per-task change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Spawn the background drain loop.
    pub fn start(self: &Arc<Self>) -> DrainHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let processor = Arc::clone(self);
        let join = tokio::spawn(async move {
            processor.drain_loop(&mut shutdown_rx).await;
        });
        DrainHandle { shutdown_tx, join }
    }

    async fn drain_loop(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.pick_next().await {
                Some(task) => self.execute(task).await,
                None => {
                    // Sleep until something changes, or until the earliest
                    // backoff deadline makes a retried task due.
                    match self.next_backoff_wake().await {
                        Some(delay) => {
                            tokio::select! {
                                _ = shutdown_rx.changed() => {}
                                _ = self.notify.notified() => {}
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = shutdown_rx.changed() => {}
                                _ = self.notify.notified() => {}
                            }
                        }
                    }
                }
            }
        }
        debug!("drain loop stopped");
    }

    /// Claim the next due task: highest priority first, FIFO within a
    /// priority band. Applies the pickup transition and persists it.
    async fn pick_next(&self) -> Option<Task> {
        let picked = {
            let mut state = self.state.lock().await;
            if state.paused || state.in_flight.is_some() {
                return None;
            }
            let now = Utc::now();
            let id = state
                .tasks
                .values()
                .filter(|t| t.is_due(now))
                .max_by(|a, b| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)))
                .map(|t| t.id)?;

            let task = state.tasks.get_mut(&id)?;
            task.start_attempt();
            let snapshot = task.clone();
            state.in_flight = Some(id);
            snapshot
        };

        debug!(task_id = %picked.id, attempt = picked.attempts, "picked up");
        if let Err(e) = self.repository.update(&picked).await {
            warn!(task_id = %picked.id, error = %e, "pickup write-back failed");
        }
        self.publish(TaskEvent::Updated(picked.clone()));
        Some(picked)
    }

    /// Run one generation and apply the outcome. Never returns an error:
    /// the outcome lands in the task, and quota exhaustion pauses the queue.
    async fn execute(&self, task: Task) {
        let resolved = prompt::resolve(&task.prompt, &task.tokens);
        let outcome = self
            .client
            .generate(&resolved, &task.provider_options)
            .await;

        let (updated, disposition) = {
            let mut state = self.state.lock().await;
            state.in_flight = None;

            let Some(current) = state.tasks.get_mut(&task.id) else {
                // Swept from the local view mid-flight; nothing to record.
                return;
            };

            let disposition = match &outcome {
                Ok(generation) => {
                    current.complete(generation.clone());
                    None
                }
                Err(error) => {
                    let delay = self.config.retry.next_delay(current.attempts);
                    let retry_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::zero());
                    Some(current.record_failure(error, Some(retry_at)))
                }
            };

            let snapshot = current.clone();
            if matches!(disposition, Some(FailureOutcome::CircuitBroken)) {
                state.paused = true;
            }
            (snapshot, disposition)
        };

        match disposition {
            None if updated.status == TaskStatus::Completed => {
                info!(task_id = %updated.id, "completed")
            }
            // Cancelled while the call was in flight; the result was dropped.
            None => debug!(task_id = %updated.id, "late result discarded"),
            Some(FailureOutcome::Retried) => {
                debug!(
                    task_id = %updated.id,
                    attempt = updated.attempts,
                    "retry scheduled"
                )
            }
            Some(FailureOutcome::Failed) => {
                warn!(task_id = %updated.id, attempts = updated.attempts, "failed")
            }
            Some(FailureOutcome::CircuitBroken) => {
                warn!(task_id = %updated.id, "credits exhausted, queue paused")
            }
        }

        if let Err(e) = self.repository.update(&updated).await {
            warn!(task_id = %updated.id, error = %e, "outcome write-back failed");
        }
        self.publish(TaskEvent::Updated(updated));
        self.notify.notify_one();
    }

    /// How long until the earliest retried task becomes due, if waiting is
    /// the only thing left to do.
    async fn next_backoff_wake(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        if state.paused || state.in_flight.is_some() {
            return None;
        }
        let now = Utc::now();
        state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter_map(|t| t.next_run_at)
            .filter(|at| *at > now)
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    async fn write_back(&self, task: &Task) -> Result<(), QueueError> {
        self.repository.update(task).await?;
        Ok(())
    }

    fn publish(&self, event: TaskEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GenerateError, Generation};
    use crate::impls::InMemoryRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    /// Succeeds every call, recording the resolved prompts in order.
    struct RecordingClient {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingClient {
        fn new() -> Self {
            Self {
                prompts: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationClient for RecordingClient {
        async fn generate(
            &self,
            prompt: &str,
            _options: &serde_json::Value,
        ) -> Result<Generation, GenerateError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(Generation::new("https://cdn.example/out.png", "gen-42"))
        }
    }

    /// Always fails with a retryable provider error.
    struct FlakyClient;

    #[async_trait]
    impl GenerationClient for FlakyClient {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &serde_json::Value,
        ) -> Result<Generation, GenerateError> {
            Err(GenerateError::Provider {
                message: "502 from upstream".into(),
                status_code: Some(502),
                retryable: true,
            })
        }
    }

    /// Reports quota exhaustion on the first call, succeeds afterwards.
    struct QuotaOnFirstCall {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerationClient for QuotaOnFirstCall {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &serde_json::Value,
        ) -> Result<Generation, GenerateError> {
            if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(GenerateError::QuotaExhausted { remaining: 0 })
            } else {
                Ok(Generation::new("https://cdn.example/out.png", "gen-1"))
            }
        }
    }

    /// Blocks until released, then succeeds. Lets tests race a cancel
    /// against an in-flight generation deterministically.
    struct GatedClient {
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl GenerationClient for GatedClient {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &serde_json::Value,
        ) -> Result<Generation, GenerateError> {
            let permit = self.gate.acquire().await.map_err(|_| GenerateError::Provider {
                message: "gate closed".into(),
                status_code: None,
                retryable: false,
            })?;
            permit.forget();
            Ok(Generation::new("https://cdn.example/late.png", "gen-late"))
        }
    }

    fn processor(client: Arc<dyn GenerationClient>) -> Arc<QueueProcessor> {
        Arc::new(QueueProcessor::new(
            Arc::new(InMemoryRepository::new()),
            client,
            QueueConfig::default().with_retry(RetryPolicy::immediate()),
        ))
    }

    /// Wait until the queue's stats satisfy the predicate, driven by the
    /// event stream so tests never poll.
    async fn wait_for(
        processor: &Arc<QueueProcessor>,
        predicate: impl Fn(&QueueStats) -> bool,
    ) {
        let mut events = processor.subscribe();
        timeout(WAIT, async {
            loop {
                if predicate(&processor.stats().await) {
                    break;
                }
                // Lagged receivers just retry on the next event.
                let _ = events.recv().await;
            }
        })
        .await
        .expect("queue did not reach the expected state in time");
    }

    #[tokio::test]
    async fn resolves_tokens_and_completes() {
        let client = Arc::new(RecordingClient::new());
        let processor = processor(client.clone());

        let task = processor
            .enqueue(TaskDraft::new("Hello {{NAME}}").with_token("NAME", "Ada"))
            .await
            .unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;

        let done = processor.task(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(
            done.result.as_ref().unwrap().artifact_url,
            "https://cdn.example/out.png"
        );
        assert!(done.error_message.is_none());
        assert_eq!(client.seen(), vec!["Hello Ada".to_string()]);
    }

    #[tokio::test]
    async fn rejects_prompts_that_resolve_to_empty() {
        let processor = processor(Arc::new(RecordingClient::new()));

        let err = processor
            .enqueue(TaskDraft::new("{{GONE}}").with_token("GONE", "   "))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::EmptyPrompt));
        assert_eq!(processor.stats().await.total, 0);
    }

    #[tokio::test]
    async fn drains_by_priority_then_fifo() {
        let client = Arc::new(RecordingClient::new());
        let processor = processor(client.clone());

        for (prompt, priority) in [("low", 0), ("urgent", 2), ("high", 1)] {
            processor
                .enqueue(TaskDraft::new(prompt).with_priority(priority))
                .await
                .unwrap();
        }

        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 3).await;
        handle.shutdown_and_join().await;

        assert_eq!(client.seen(), vec!["urgent", "high", "low"]);
    }

    #[tokio::test]
    async fn equal_priority_drains_in_enqueue_order() {
        let client = Arc::new(RecordingClient::new());
        let processor = processor(client.clone());

        processor.enqueue(TaskDraft::new("first")).await.unwrap();
        processor.enqueue(TaskDraft::new("second")).await.unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 2).await;
        handle.shutdown_and_join().await;

        assert_eq!(client.seen(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn retryable_failures_exhaust_attempts_then_fail() {
        let processor = processor(Arc::new(FlakyClient));

        let task = processor
            .enqueue(TaskDraft::new("doomed").with_max_attempts(2))
            .await
            .unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.failed == 1).await;
        handle.shutdown_and_join().await;

        let failed = processor.task(task.id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.attempts, 2);
        assert!(failed.error_message.as_deref().unwrap().contains("502"));
    }

    #[tokio::test]
    async fn quota_exhaustion_pauses_the_queue_and_spares_pending_tasks() {
        let processor = processor(Arc::new(QuotaOnFirstCall {
            calls: AtomicU32::new(0),
        }));

        let first = processor.enqueue(TaskDraft::new("first")).await.unwrap();
        let second = processor.enqueue(TaskDraft::new("second")).await.unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.failed == 1).await;
        handle.shutdown_and_join().await;

        assert!(processor.is_paused().await);

        let broken = processor.task(first.id).await.unwrap();
        assert_eq!(broken.status, TaskStatus::Failed);
        assert!(broken.error_message.as_deref().unwrap().contains("exhausted"));

        // The untouched task is still pending, ready for when credits return.
        let untouched = processor.task(second.id).await.unwrap();
        assert_eq!(untouched.status, TaskStatus::Pending);
        assert_eq!(untouched.attempts, 0);
    }

    #[tokio::test]
    async fn resuming_after_quota_drains_the_remainder() {
        let processor = processor(Arc::new(QuotaOnFirstCall {
            calls: AtomicU32::new(0),
        }));

        processor.enqueue(TaskDraft::new("first")).await.unwrap();
        let second = processor.enqueue(TaskDraft::new("second")).await.unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.failed == 1).await;

        processor.set_paused(false).await;
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;

        let done = processor.task(second.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_pending_task_is_never_picked_up() {
        let client = Arc::new(RecordingClient::new());
        let processor = processor(client.clone());

        let doomed = processor.enqueue(TaskDraft::new("doomed")).await.unwrap();
        let kept = processor.enqueue(TaskDraft::new("kept")).await.unwrap();
        processor.cancel(doomed.id).await.unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;

        assert_eq!(client.seen(), vec!["kept"]);
        assert_eq!(
            processor.task(doomed.id).await.unwrap().status,
            TaskStatus::Cancelled
        );
        assert_eq!(
            processor.task(kept.id).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn cancel_of_unknown_task_is_an_error() {
        let processor = processor(Arc::new(RecordingClient::new()));
        let err = processor.cancel(TaskId::generate()).await.unwrap_err();
        assert!(matches!(err, QueueError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_racing_an_in_flight_generation_discards_the_late_result() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let processor = processor(Arc::new(GatedClient { gate: gate.clone() }));

        let task = processor.enqueue(TaskDraft::new("slow")).await.unwrap();
        let handle = processor.start();

        wait_for(&processor, |s| s.processing == 1).await;
        processor.cancel(task.id).await.unwrap();
        gate.add_permits(1);

        // The loop finishes the in-flight call and moves on; give it a
        // moment to apply (and discard) the late outcome.
        wait_for(&processor, |s| s.processing == 0).await;
        handle.shutdown_and_join().await;

        let cancelled = processor.task(task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(cancelled.result.is_none());
    }

    #[tokio::test]
    async fn requeue_resets_a_failed_task_for_a_fresh_run() {
        let processor = processor(Arc::new(FlakyClient));

        let task = processor
            .enqueue(TaskDraft::new("doomed").with_max_attempts(1))
            .await
            .unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.failed == 1).await;
        handle.shutdown_and_join().await;

        let requeued = processor.requeue(task.id).await.unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(requeued.attempts, 0);
        assert!(requeued.error_message.is_none());
    }

    #[tokio::test]
    async fn requeue_of_a_never_processed_task_changes_nothing_visible() {
        let processor = processor(Arc::new(RecordingClient::new()));

        let before = processor.enqueue(TaskDraft::new("idle")).await.unwrap();
        let after = processor.requeue(before.id).await.unwrap();

        assert_eq!(after.status, before.status);
        assert_eq!(after.attempts, before.attempts);
        assert_eq!(after.priority, before.priority);
        assert_eq!(after.prompt, before.prompt);
        assert!(after.error_message.is_none());
        assert!(after.result.is_none());
    }

    #[tokio::test]
    async fn requeue_of_unknown_task_is_an_error() {
        let processor = processor(Arc::new(RecordingClient::new()));
        let err = processor.requeue(TaskId::generate()).await.unwrap_err();
        assert!(matches!(err, QueueError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn pause_gates_pickup_and_resume_drains() {
        let processor = processor(Arc::new(RecordingClient::new()));
        processor.set_paused(true).await;

        processor.enqueue(TaskDraft::new("waiting")).await.unwrap();
        let handle = processor.start();

        // Draining is gated; the task must still be pending after a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processor.stats().await.pending, 1);

        processor.set_paused(false).await;
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn remove_completed_sweeps_the_local_view_only() {
        let repo = Arc::new(InMemoryRepository::new());
        let processor = Arc::new(QueueProcessor::new(
            repo.clone(),
            Arc::new(RecordingClient::new()),
            QueueConfig::default().with_retry(RetryPolicy::immediate()),
        ));

        processor.enqueue(TaskDraft::new("done")).await.unwrap();
        let cancelled = processor.enqueue(TaskDraft::new("dropped")).await.unwrap();
        processor.cancel(cancelled.id).await.unwrap();

        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;

        assert_eq!(processor.remove_completed().await, 2);
        assert_eq!(processor.stats().await.total, 0);

        // The repository retains every row.
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn load_hydrates_the_cache_from_the_repository() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert(TaskDraft::new("persisted")).await.unwrap();

        let processor = Arc::new(QueueProcessor::new(
            repo,
            Arc::new(RecordingClient::new()),
            QueueConfig::default(),
        ));

        assert_eq!(processor.load().await.unwrap(), 1);
        assert_eq!(processor.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn events_report_every_transition() {
        let processor = processor(Arc::new(RecordingClient::new()));
        let mut events = processor.subscribe();

        let task = processor.enqueue(TaskDraft::new("observed")).await.unwrap();
        let handle = processor.start();
        wait_for(&processor, |s| s.completed == 1).await;
        handle.shutdown_and_join().await;

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TaskEvent::Updated(t) = event
                && t.id == task.id
            {
                statuses.push(t.status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Pending,
                TaskStatus::Processing,
                TaskStatus::Completed
            ]
        );
    }
}
