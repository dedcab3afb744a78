use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Task, TaskEnvelope, TaskQueue};
use crate::error::PipelineError;

struct Inflight {
    deadline: Instant,
    envelope: TaskEnvelope,
}

/// In-process stand-in for `RedisTaskQueue`, used by worker/ingest tests and
/// `tests/e2e.rs` so they don't need a live Redis.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    pending: Mutex<VecDeque<TaskEnvelope>>,
    inflight: Mutex<HashMap<String, Inflight>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), PipelineError> {
        self.pending.lock().await.push_back(TaskEnvelope::new(task));
        Ok(())
    }

    async fn dequeue(
        &self,
        _consumer_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<TaskEnvelope>, PipelineError> {
        let envelope = {
            let mut pending = self.pending.lock().await;
            pending.pop_front()
        };
        let Some(envelope) = envelope else {
            return Ok(None);
        };
        self.inflight.lock().await.insert(
            envelope.task_id.clone(),
            Inflight {
                deadline: Instant::now() + visibility_timeout,
                envelope: envelope.clone(),
            },
        );
        Ok(Some(envelope))
    }

    async fn ack(&self, _consumer_id: &str, task_id: &str) -> Result<(), PipelineError> {
        self.inflight.lock().await.remove(task_id);
        Ok(())
    }

    async fn nack(&self, _consumer_id: &str, envelope: TaskEnvelope) -> Result<(), PipelineError> {
        self.inflight.lock().await.remove(&envelope.task_id);
        self.pending.lock().await.push_back(envelope.redelivered());
        Ok(())
    }

    async fn pending_len(&self) -> Result<usize, PipelineError> {
        Ok(self.pending.lock().await.len())
    }

    async fn sweep_expired(&self) -> Result<usize, PipelineError> {
        let now = Instant::now();
        let mut inflight = self.inflight.lock().await;
        let expired: Vec<String> = inflight
            .iter()
            .filter(|(_, v)| v.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let mut requeued = 0;
        let mut pending = self.pending.lock().await;
        for task_id in expired {
            if let Some(entry) = inflight.remove(&task_id) {
                pending.push_back(entry.envelope.redelivered());
                requeued += 1;
            }
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnderlyingTick;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn sample_task() -> Task {
        Task::EnrichTick(UnderlyingTick {
            product: "NIFTY".to_string(),
            tick_id: 1,
            price: dec!(100),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_then_ack_clears_inflight() {
        let q = InMemoryTaskQueue::new();
        q.enqueue(sample_task()).await.unwrap();
        let envelope = q.dequeue("w1", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(envelope.attempt, 1);
        q.ack("w1", &envelope.task_id).await.unwrap();
        assert_eq!(q.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_requeues_with_incremented_attempt() {
        let q = InMemoryTaskQueue::new();
        q.enqueue(sample_task()).await.unwrap();
        let envelope = q.dequeue("w1", Duration::from_secs(60)).await.unwrap().unwrap();
        q.nack("w1", envelope).await.unwrap();
        let redelivered = q.dequeue("w1", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test]
    async fn sweep_requeues_entries_past_their_visibility_deadline() {
        let q = InMemoryTaskQueue::new();
        q.enqueue(sample_task()).await.unwrap();
        let _envelope = q.dequeue("w1", Duration::from_millis(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(q.sweep_expired().await.unwrap(), 1);
        assert_eq!(q.pending_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pending_len_reflects_queue_depth() {
        let q = InMemoryTaskQueue::new();
        q.enqueue(sample_task()).await.unwrap();
        q.enqueue(sample_task()).await.unwrap();
        assert_eq!(q.pending_len().await.unwrap(), 2);
    }
}
