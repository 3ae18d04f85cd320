use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use easel_core::batch::{BatchConfig, BatchRunner};
use easel_core::domain::{GenerateError, Generation, Task, TaskDraft, TaskEvent};
use easel_core::impls::InMemoryRepository;
use easel_core::ports::GenerationClient;
use easel_core::queue::{QueueConfig, QueueProcessor, RetryPolicy};

/// Demo provider: fails transiently a few times, then produces fake
/// artifact URLs. Stands in for the real generation backend.
struct DemoProvider {
    remaining_failures: AtomicU32,
    generated: AtomicU32,
}

impl DemoProvider {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            generated: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl GenerationClient for DemoProvider {
    async fn generate(
        &self,
        prompt: &str,
        _options: &serde_json::Value,
    ) -> Result<Generation, GenerateError> {
        // Pretend the provider takes a moment.
        sleep(Duration::from_millis(100)).await;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(GenerateError::Provider {
                message: format!("intentional transient failure (left={left})"),
                status_code: Some(503),
                retryable: true,
            });
        }

        let n = self.generated.fetch_add(1, Ordering::Relaxed);
        println!("provider: generated for {prompt:?}");
        Ok(Generation::new(
            format!("https://cdn.example/artifacts/{n}.png"),
            format!("gen-{n}"),
        ))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) Wire the processor: in-memory store, demo provider, fast retries.
    let provider = Arc::new(DemoProvider::new(2));
    let processor = Arc::new(QueueProcessor::new(
        Arc::new(InMemoryRepository::new()),
        provider.clone(),
        QueueConfig::default().with_retry(RetryPolicy {
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }),
    ));

    // (B) Watch the change stream like a UI would.
    let mut events = processor.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let TaskEvent::Updated(task) = event {
                println!(
                    "event: {} -> {} (attempts={})",
                    task.id, task.status, task.attempts
                );
            }
        }
    });

    // (C) Start draining and enqueue a few tasks; higher priority first.
    tracing::info!("starting the drain loop");
    let drain = processor.start();
    for (prompt, priority) in [
        ("A watercolor [ANIMAL] at dusk", 0),
        ("Hello {{NAME}}, in neon", 2),
        ("A quiet harbor, oil on canvas", 1),
    ] {
        processor
            .enqueue(
                TaskDraft::new(prompt)
                    .with_token("ANIMAL", "heron")
                    .with_token("NAME", "Ada")
                    .with_priority(priority),
            )
            .await
            .expect("enqueue");
    }

    // (D) Wait for the queue to go quiet, then report.
    loop {
        let stats = processor.stats().await;
        if stats.is_quiescent() {
            println!(
                "queue done: {} completed, {} failed",
                stats.completed, stats.failed
            );
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    drain.shutdown_and_join().await;

    // (E) The same provider, through the batch runner.
    let runner = BatchRunner::new(
        provider,
        BatchConfig::default()
            .with_concurrency(2)
            .with_inter_task_delay(Duration::from_millis(100)),
    );
    let tasks: Vec<Task> = (1..=4)
        .map(|i| Task::ephemeral(TaskDraft::new(format!("batch artwork #{i}"))))
        .collect();
    let done = runner.run(tasks).await;
    for task in &done {
        println!(
            "batch: {:?} -> {} ({})",
            task.prompt,
            task.status,
            task.result
                .as_ref()
                .map(|r| r.artifact_url.as_str())
                .unwrap_or("no artifact")
        );
    }

    watcher.abort();
}
