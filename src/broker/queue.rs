use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{Task, TaskEnvelope, TaskQueue};
use crate::error::PipelineError;

const PENDING_KEY: &str = "broker:pending";
const INFLIGHT_META_KEY: &str = "broker:inflight_meta";

fn inflight_list_key(consumer_id: &str) -> String {
    format!("broker:inflight:{consumer_id}")
}

fn transient(e: redis::RedisError) -> PipelineError {
    PipelineError::TransientBackend(e.to_string())
}

fn decode_err(e: serde_json::Error) -> PipelineError {
    PipelineError::EnvelopeInvalid(e.to_string())
}

/// Tracks which consumer holds a task and when its visibility lock expires,
/// alongside the exact payload text so `ack`/`nack`/`sweep_expired` can
/// `LREM` the matching element out of that consumer's in-flight list.
#[derive(Serialize, Deserialize)]
struct InflightMeta {
    consumer_id: String,
    deadline_ms: i64,
    payload: String,
}

/// Real backend: Redis list for the pending queue, one list per consumer for
/// in-flight visibility locks, a hash recording lock deadlines for the
/// sweeper. See §4.F.
#[derive(Clone)]
pub struct RedisTaskQueue {
    manager: redis::aio::ConnectionManager,
}

impl RedisTaskQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url).map_err(transient)?;
        let manager = client.get_connection_manager().await.map_err(transient)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<(), PipelineError> {
        let envelope = TaskEnvelope::new(task);
        let payload = serde_json::to_string(&envelope).map_err(decode_err)?;
        let mut conn = self.manager.clone();
        conn.lpush::<_, _, ()>(PENDING_KEY, payload).await.map_err(transient)
    }

    async fn dequeue(
        &self,
        consumer_id: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<TaskEnvelope>, PipelineError> {
        let mut conn = self.manager.clone();
        let inflight_key = inflight_list_key(consumer_id);

        // Short poll timeout (not the visibility timeout) so callers can
        // interleave shutdown checks between empty polls.
        let reply: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(PENDING_KEY)
            .arg(&inflight_key)
            .arg(1u64)
            .query_async(&mut conn)
            .await
            .map_err(transient)?;

        let Some(payload) = reply else {
            return Ok(None);
        };
        let envelope: TaskEnvelope = serde_json::from_str(&payload).map_err(decode_err)?;

        let deadline_ms = (Utc::now() + chrono::Duration::from_std(visibility_timeout).unwrap_or_default())
            .timestamp_millis();
        let meta = InflightMeta {
            consumer_id: consumer_id.to_string(),
            deadline_ms,
            payload,
        };
        let meta_json = serde_json::to_string(&meta).map_err(decode_err)?;
        conn.hset::<_, _, _, ()>(INFLIGHT_META_KEY, &envelope.task_id, meta_json)
            .await
            .map_err(transient)?;

        Ok(Some(envelope))
    }

    async fn ack(&self, consumer_id: &str, task_id: &str) -> Result<(), PipelineError> {
        let mut conn = self.manager.clone();
        let meta_json: Option<String> = conn.hget(INFLIGHT_META_KEY, task_id).await.map_err(transient)?;
        if let Some(meta_json) = meta_json {
            let meta: InflightMeta = serde_json::from_str(&meta_json).map_err(decode_err)?;
            conn.lrem::<_, _, ()>(inflight_list_key(consumer_id), 1, meta.payload)
                .await
                .map_err(transient)?;
        }
        conn.hdel::<_, _, ()>(INFLIGHT_META_KEY, task_id).await.map_err(transient)
    }

    async fn nack(&self, consumer_id: &str, envelope: TaskEnvelope) -> Result<(), PipelineError> {
        let mut conn = self.manager.clone();
        let meta_json: Option<String> = conn
            .hget(INFLIGHT_META_KEY, &envelope.task_id)
            .await
            .map_err(transient)?;
        if let Some(meta_json) = meta_json {
            let meta: InflightMeta = serde_json::from_str(&meta_json).map_err(decode_err)?;
            conn.lrem::<_, _, ()>(inflight_list_key(consumer_id), 1, meta.payload)
                .await
                .map_err(transient)?;
        }
        conn.hdel::<_, _, ()>(INFLIGHT_META_KEY, &envelope.task_id)
            .await
            .map_err(transient)?;

        let redelivered = envelope.redelivered();
        let payload = serde_json::to_string(&redelivered).map_err(decode_err)?;
        conn.lpush::<_, _, ()>(PENDING_KEY, payload).await.map_err(transient)
    }

    async fn pending_len(&self) -> Result<usize, PipelineError> {
        let mut conn = self.manager.clone();
        let len: i64 = conn.llen(PENDING_KEY).await.map_err(transient)?;
        Ok(len.max(0) as usize)
    }

    async fn sweep_expired(&self) -> Result<usize, PipelineError> {
        let mut conn = self.manager.clone();
        let all: std::collections::HashMap<String, String> =
            conn.hgetall(INFLIGHT_META_KEY).await.map_err(transient)?;
        let now_ms = Utc::now().timestamp_millis();

        let mut requeued = 0usize;
        for (task_id, meta_json) in all {
            let meta: InflightMeta = match serde_json::from_str(&meta_json) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.deadline_ms > now_ms {
                continue;
            }
            conn.lrem::<_, _, ()>(inflight_list_key(&meta.consumer_id), 1, &meta.payload)
                .await
                .map_err(transient)?;
            conn.hdel::<_, _, ()>(INFLIGHT_META_KEY, &task_id)
                .await
                .map_err(transient)?;

            if let Ok(envelope) = serde_json::from_str::<TaskEnvelope>(&meta.payload) {
                let redelivered = envelope.redelivered();
                if let Ok(payload) = serde_json::to_string(&redelivered) {
                    conn.lpush::<_, _, ()>(PENDING_KEY, payload).await.map_err(transient)?;
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }
}
