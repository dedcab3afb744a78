use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{OptionChain, Product, UnderlyingTick, WindowSize};

/// §4.C task kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum Task {
    EnrichTick(UnderlyingTick),
    EnrichChain(OptionChain),
    RecomputeOhlc {
        product: Product,
        window: WindowSize,
        t_start: DateTime<Utc>,
    },
}

impl Task {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Task::EnrichTick(_) => "enrich_tick",
            Task::EnrichChain(_) => "enrich_chain",
            Task::RecomputeOhlc { .. } => "recompute_ohlc",
        }
    }
}

/// A task plus the broker-level metadata the worker/retry layer needs:
/// identity for ack/nack, and a redelivery count visible to workers per §4.F.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: String,
    pub task: Task,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task: Task) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            task,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    pub fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self.enqueued_at = Utc::now();
        self
    }
}
