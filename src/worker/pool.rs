use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use super::retry::{self, RetryDecision};
use super::runner::TaskRunner;
use crate::broker::TaskQueue;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::model::DlqEntry;

/// §5 enrichment worker pool, shaped after the teacher's
/// `DomeEnrichmentService::spawn_workers`: a fixed number of tokio tasks each
/// pulling from a shared queue in a loop, logging and moving on when a single
/// job fails. The durable-queue ack/nack/DLQ bookkeeping has no teacher
/// equivalent and follows §4.C's state machine directly.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    cache: Arc<dyn CacheStore>,
    config: Config,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        runner: Arc<dyn TaskRunner>,
        cache: Arc<dyn CacheStore>,
        config: Config,
    ) -> Self {
        Self {
            queue,
            runner,
            cache,
            config,
        }
    }

    /// Spawns `config.worker_count` consumer loops plus one periodic sweeper.
    /// `shutdown` going `true` stops every loop at its next poll boundary.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let workers = self.config.worker_count.max(1);
        let mut handles = Vec::with_capacity(workers + 1);

        for i in 0..workers {
            let pool = self.clone();
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(i, &mut shutdown).await;
            }));
        }

        let pool = self.clone();
        let mut shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            pool.sweeper_loop(&mut shutdown).await;
        }));

        handles
    }

    async fn worker_loop(&self, worker_index: usize, shutdown: &mut watch::Receiver<bool>) {
        let consumer_id = format!("worker-{worker_index}");
        info!(consumer_id = %consumer_id, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                dequeued = self.queue.dequeue(&consumer_id, self.config.task_hard_timeout) => {
                    match dequeued {
                        Ok(Some(envelope)) => self.handle_envelope(&consumer_id, envelope).await,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(consumer_id = %consumer_id, error = %e, "dequeue failed, backing off");
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                    }
                }
            }
        }
        info!(consumer_id = %consumer_id, "worker stopped");
    }

    async fn handle_envelope(&self, consumer_id: &str, envelope: crate::broker::TaskEnvelope) {
        let task_id = envelope.task_id.clone();
        let started = tokio::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.config.task_hard_timeout,
            self.runner.process(&envelope.task),
        )
        .await;

        let elapsed = started.elapsed();
        if elapsed > self.config.task_soft_timeout {
            warn!(task_id = %task_id, elapsed_ms = elapsed.as_millis() as u64, "task exceeded soft time limit");
        }

        match outcome {
            Ok(Ok(())) => {
                if let Err(e) = self.queue.ack(consumer_id, &task_id).await {
                    warn!(task_id = %task_id, error = %e, "ack failed");
                }
            }
            Ok(Err(err)) => self.handle_failure(consumer_id, envelope, err).await,
            Err(_) => {
                // Hard limit exceeded (§5). We abandon the future rather than
                // literally kill the worker task; the in-flight visibility
                // lock expires on its own and the sweeper redelivers it.
                warn!(task_id = %task_id, "task exceeded hard time limit, abandoning for redelivery");
            }
        }
    }

    async fn handle_failure(
        &self,
        consumer_id: &str,
        envelope: crate::broker::TaskEnvelope,
        error: crate::error::PipelineError,
    ) {
        let task_id = envelope.task_id.clone();
        match retry::decide(&error, envelope.attempt, &self.config) {
            RetryDecision::RetryAfter(delay) => {
                warn!(task_id = %task_id, attempt = envelope.attempt, error = %error, "task failed, retrying");
                tokio::time::sleep(delay).await;
                if let Err(e) = self.queue.nack(consumer_id, envelope).await {
                    warn!(task_id = %task_id, error = %e, "nack failed");
                }
            }
            RetryDecision::DeadLetter => {
                warn!(task_id = %task_id, error = %error, "task failed permanently, sending to DLQ");
                let entry = DlqEntry {
                    task_kind: envelope.task.kind_name().to_string(),
                    task_id: task_id.clone(),
                    error: error.to_string(),
                    args: serde_json::to_value(&envelope.task).unwrap_or(serde_json::Value::Null),
                    failed_at: chrono::Utc::now(),
                };
                if let Err(e) = self.cache.append_dlq(&entry).await {
                    warn!(task_id = %task_id, error = %e, "append_dlq failed");
                }
                if let Err(e) = self.queue.ack(consumer_id, &task_id).await {
                    warn!(task_id = %task_id, error = %e, "ack after dead-letter failed");
                }
            }
        }
    }

    /// Requeues in-flight tasks whose visibility timeout elapsed without an
    /// ack — crash recovery for a worker that died mid-task (§5).
    async fn sweeper_loop(&self, shutdown: &mut watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(30));
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                _ = ticker.tick() => {
                    match self.queue.sweep_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!(requeued = n, "swept expired in-flight tasks"),
                        Err(e) => warn!(error = %e, "sweep_expired failed"),
                    }
                }
            }
        }
    }
}
