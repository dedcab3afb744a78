//! §4.B cache/store adapter — the KV/TTL/idempotency/pub-sub half. Document
//! store writes (`insert_tick`/`insert_chain`) live in `crate::store`; the
//! contract is split the same way spec §4.B vs §4.G/§6 splits it.

mod in_memory;
mod redis_store;

pub use in_memory::InMemoryCacheStore;
pub use redis_store::RedisCacheStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineError;
use crate::model::DlqEntry;

/// Result of the atomic set-if-absent primitive underlying idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkResult {
    Acquired,
    AlreadySet,
}

/// One message delivered off a subscription.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A cancellable consumer handle. Dropping it stops the underlying
/// subscription task (the background task's send fails once the receiver is
/// gone, and it exits on the next send attempt).
pub struct Subscription {
    rx: tokio::sync::mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub fn new(rx: tokio::sync::mpsc::Receiver<BusMessage>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}

/// Public contract from spec §4.B, verb for verb.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PipelineError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;
    /// Atomic set-if-absent with expiration — the idempotency primitive.
    async fn try_mark_once(&self, key: &str, ttl: Duration) -> Result<MarkResult, PipelineError>;
    /// Non-blocking append to the DLQ list.
    async fn append_dlq(&self, entry: &DlqEntry) -> Result<(), PipelineError>;
    /// Fire-and-forget pub/sub publish. Delivery is best-effort.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PipelineError>;
    /// Blocking (async) consumer over one or more topics. Cancellable by
    /// dropping the returned `Subscription`.
    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, PipelineError>;
}

/// Typed convenience helpers layered on the byte-oriented trait, so callers
/// don't hand-roll `serde_json::to_vec`/`from_slice` at every call site.
pub mod typed {
    use super::*;
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    pub async fn put_with_ttl<T: Serialize + Sync>(
        store: &dyn CacheStore,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("serialize {key}: {e}")))?;
        store.put_with_ttl(key, &bytes, ttl).await
    }

    pub async fn get<T: DeserializeOwned>(
        store: &dyn CacheStore,
        key: &str,
    ) -> Result<Option<T>, PipelineError> {
        match store.get(key).await? {
            None => Ok(None),
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| PipelineError::EnvelopeInvalid(format!("deserialize {key}: {e}")))?;
                Ok(Some(value))
            }
        }
    }

    pub async fn publish<T: Serialize + Sync>(
        store: &dyn CacheStore,
        topic: &str,
        value: &T,
    ) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PipelineError::EnvelopeInvalid(format!("serialize {topic}: {e}")))?;
        store.publish(topic, &bytes).await
    }
}
