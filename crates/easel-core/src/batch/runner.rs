//! Batch runner: N workers draining a caller-supplied task list.
//!
//! Faster than the single-flight queue but still bounded, so a batch of
//! fifty prompts does not hammer the provider. Workers share two things:
//! a claim cursor (a monotonically increasing index over the list; claiming
//! is one atomic `fetch_add`, so task N+1 is never claimed before task N)
//! and a cancellation flag. The flag doubles as the credit circuit breaker:
//! the worker that sees quota exhaustion sets it for everyone, and siblings
//! stop claiming after their current task.
//!
//! The list is ephemeral; nothing here touches a repository. Tasks the run
//! never claimed stay `Pending`, so a circuit-broken batch reads as
//! "partially completed, N items still waiting" and can be re-run once
//! credits are replenished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::domain::{BatchId, FailureOutcome, Task, TaskEvent, TaskStatus, prompt};
use crate::ports::GenerationClient;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Batch runner configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Logical workers draining the list. Clamped to at least 1; 1-3 is the
    /// intended range.
    pub concurrency: usize,

    /// Pause after each executed task before the worker claims again. This
    /// paces request volume even when several workers are active.
    pub inter_task_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            inter_task_delay: Duration::from_millis(1000),
        }
    }
}

impl BatchConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_inter_task_delay(mut self, delay: Duration) -> Self {
        self.inter_task_delay = delay;
        self
    }
}

/// Bounded-concurrency runner over an ephemeral task list.
pub struct BatchRunner {
    client: Arc<dyn GenerationClient>,
    config: BatchConfig,
    cancelled: Arc<AtomicBool>,
    events: broadcast::Sender<TaskEvent>,
}

impl BatchRunner {
    pub fn new(client: Arc<dyn GenerationClient>, config: BatchConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Subscribe to per-task progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Ask the workers to stop. Observed before the next claim; a task
    /// already in flight is allowed to finish.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Reset every failed task to pending for a fresh pass. Attempts are
    /// cleared along with the error, so the retried tasks get their full
    /// ceiling back. Returns how many were reset.
    pub fn retry_failed(&self, tasks: &mut [Task]) -> usize {
        let mut reset = 0;
        for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Failed) {
            task.requeue();
            reset += 1;
        }
        reset
    }

    /// Process the list with `min(concurrency, len)` workers and return it
    /// with final statuses. The cancellation flag is cleared on entry, so a
    /// previously circuit-broken list can be resumed by running it again.
    pub async fn run(&self, tasks: Vec<Task>) -> Vec<Task> {
        if tasks.is_empty() {
            return tasks;
        }
        self.cancelled.store(false, Ordering::Relaxed);

        let batch_id = BatchId::generate();
        let total = tasks.len();
        let workers = self.config.concurrency.max(1).min(total);
        info!(batch_id = %batch_id, total, workers, "batch started");

        let shared = Arc::new(Mutex::new(tasks));
        let cursor = Arc::new(AtomicUsize::new(0));

        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let client = Arc::clone(&self.client);
            let tasks = Arc::clone(&shared);
            let cursor = Arc::clone(&cursor);
            let cancelled = Arc::clone(&self.cancelled);
            let events = self.events.clone();
            let delay = self.config.inter_task_delay;

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, client, tasks, cursor, cancelled, events, delay).await;
            }));
        }
        for join in joins {
            let _ = join.await;
        }

        info!(batch_id = %batch_id, cancelled = self.is_cancelled(), "batch finished");
        match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            // Unreachable once every worker has joined, but cloning beats
            // panicking in a scheduling loop.
            Err(shared) => shared.lock().await.clone(),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    client: Arc<dyn GenerationClient>,
    tasks: Arc<Mutex<Vec<Task>>>,
    cursor: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
    events: broadcast::Sender<TaskEvent>,
    delay: Duration,
) {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            debug!(worker_id, "worker observed cancellation");
            break;
        }

        // Claim the next index; one atomic increment, no lock needed.
        let index = cursor.fetch_add(1, Ordering::Relaxed);

        let claimed = {
            let mut guard = tasks.lock().await;
            if index >= guard.len() {
                break;
            }
            let entry = &mut guard[index];
            if entry.status != TaskStatus::Pending {
                // Already terminal from an earlier pass; skip without delay.
                continue;
            }
            entry.start_attempt();
            entry.clone()
        };
        let _ = events.send(TaskEvent::Updated(claimed.clone()));

        let resolved = prompt::resolve(&claimed.prompt, &claimed.tokens);
        debug!(worker_id, task_id = %claimed.id, attempt = claimed.attempts, "generating");
        let outcome = client.generate(&resolved, &claimed.provider_options).await;

        let updated = {
            let mut guard = tasks.lock().await;
            let entry = &mut guard[index];
            match &outcome {
                Ok(generation) => entry.complete(generation.clone()),
                Err(error) => {
                    // Batch retries happen across passes, not within one:
                    // the cursor never revisits an index, so a retried task
                    // simply stays pending for the next run.
                    let disposition = entry.record_failure(error, None);
                    if disposition == FailureOutcome::CircuitBroken {
                        cancelled.store(true, Ordering::Relaxed);
                        warn!(
                            worker_id,
                            task_id = %entry.id,
                            "credits exhausted, stopping the batch"
                        );
                    }
                }
            }
            entry.clone()
        };
        let _ = events.send(TaskEvent::Updated(updated));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
