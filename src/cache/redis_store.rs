use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use super::{BusMessage, CacheStore, MarkResult, Subscription};
use crate::error::PipelineError;
use crate::model::{keys, DlqEntry};

fn transient(e: redis::RedisError) -> PipelineError {
    PipelineError::TransientBackend(e.to_string())
}

/// Real backend: KV, TTL, idempotency marks, DLQ list and pub/sub, all
/// against one Redis instance (§9's Open Question decision — bus and broker
/// share the same substrate rather than splitting across two systems).
#[derive(Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(redis_url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url).map_err(transient)?;
        let manager = client.get_connection_manager().await.map_err(transient)?;
        Ok(Self { client, manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PipelineError> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs).await.map_err(transient)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(transient)
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(transient)
    }

    async fn try_mark_once(&self, key: &str, ttl: Duration) -> Result<MarkResult, PipelineError> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await
            .map_err(transient)?;
        Ok(match reply {
            Some(_) => MarkResult::Acquired,
            None => MarkResult::AlreadySet,
        })
    }

    async fn append_dlq(&self, entry: &DlqEntry) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec(entry)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("serialize dlq entry: {e}")))?;
        let mut conn = self.manager.clone();
        conn.rpush::<_, _, ()>(keys::DLQ_ENRICHMENT, payload)
            .await
            .map_err(transient)
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PipelineError> {
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(topic, payload).await.map_err(transient)
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, PipelineError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(transient)?;
        for topic in topics {
            pubsub.subscribe(*topic).await.map_err(transient)?;
        }

        let (tx, rx) = tokio::sync::mpsc::channel(256);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let topic = msg.get_channel_name().to_string();
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable redis pub/sub payload");
                        continue;
                    }
                };
                if tx.send(BusMessage { topic, payload }).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx))
    }
}
