//! §4.F task broker binding — an application-level durable queue on top of
//! a KV substrate, since a plain list lacks native late-ack.

mod in_memory;
mod queue;
mod task;

pub use in_memory::InMemoryTaskQueue;
pub use queue::RedisTaskQueue;
pub use task::{Task, TaskEnvelope};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineError;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// `LPUSH`-equivalent: durable, survives process restart.
    async fn enqueue(&self, task: Task) -> Result<(), PipelineError>;

    /// `BRPOPLPUSH`-equivalent: pulls one task into `consumer_id`'s in-flight
    /// set under a visibility lock. Returns `None` on poll timeout (callers
    /// loop, checking for shutdown between polls) rather than blocking forever.
    async fn dequeue(
        &self,
        consumer_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<TaskEnvelope>, PipelineError>;

    /// Late-ack: removes the task from `consumer_id`'s in-flight set for good.
    async fn ack(&self, consumer_id: &str, task_id: &str) -> Result<(), PipelineError>;

    /// Returns the envelope to the pending list with an incremented
    /// redelivery count, removing it from `consumer_id`'s in-flight set.
    async fn nack(&self, consumer_id: &str, envelope: TaskEnvelope) -> Result<(), PipelineError>;

    /// Length of the pending list — the backpressure signal §4.D polls.
    async fn pending_len(&self) -> Result<usize, PipelineError>;

    /// Requeues any in-flight task whose visibility timeout elapsed without
    /// an ack (crash recovery, §5's hard-limit case). Returns count requeued.
    async fn sweep_expired(&self) -> Result<usize, PipelineError>;
}
