use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{BusMessage, CacheStore, MarkResult, Subscription};
use crate::error::PipelineError;
use crate::model::DlqEntry;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map(|t| Instant::now() < t).unwrap_or(true)
    }
}

/// `parking_lot::Mutex`-guarded map + `tokio::sync::broadcast` fan-out,
/// standing in for Redis in tests. Mirrors the teacher's in-process cache
/// shape (`Arc<RwLock<HashMap<..>>>`) rather than introducing a new pattern.
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
    dlq: Mutex<Vec<DlqEntry>>,
    bus: broadcast::Sender<BusMessage>,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel(4096);
        Self {
            entries: Mutex::new(HashMap::new()),
            dlq: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Test helper: drain everything currently in the DLQ.
    pub fn dlq_snapshot(&self) -> Vec<DlqEntry> {
        self.dlq.lock().clone()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), PipelineError> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.is_live() => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn try_mark_once(&self, key: &str, ttl: Duration) -> Result<MarkResult, PipelineError> {
        let mut entries = self.entries.lock();
        if let Some(e) = entries.get(key) {
            if e.is_live() {
                return Ok(MarkResult::AlreadySet);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Vec::new(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(MarkResult::Acquired)
    }

    async fn append_dlq(&self, entry: &DlqEntry) -> Result<(), PipelineError> {
        self.dlq.lock().push(entry.clone());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PipelineError> {
        // No subscribers is not an error — matches Redis pub/sub semantics.
        let _ = self.bus.send(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, PipelineError> {
        let mut rx = self.bus.subscribe();
        let wanted: Vec<String> = topics.iter().map(|s| s.to_string()).collect();
        let (tx, out_rx) = tokio::sync::mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) if wanted.iter().any(|t| t == &msg.topic) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(out_rx))
    }
}

// Test-only convenience so fixtures can share one store across tasks.
pub type SharedInMemoryCacheStore = Arc<InMemoryCacheStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryCacheStore::new();
        store.put_with_ttl("k", b"v", StdDuration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn get_after_ttl_expiry_returns_none() {
        let store = InMemoryCacheStore::new();
        store.put_with_ttl("k", b"v", StdDuration::from_millis(1)).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn try_mark_once_is_acquire_then_already_set() {
        let store = InMemoryCacheStore::new();
        assert_eq!(
            store.try_mark_once("idem:1", StdDuration::from_secs(60)).await.unwrap(),
            MarkResult::Acquired
        );
        assert_eq!(
            store.try_mark_once("idem:1", StdDuration::from_secs(60)).await.unwrap(),
            MarkResult::AlreadySet
        );
    }

    #[tokio::test]
    async fn subscribe_only_receives_matching_topics() {
        let store = InMemoryCacheStore::new();
        let mut sub = store.subscribe(&["wanted"]).await.unwrap();
        store.publish("other", b"x").await.unwrap();
        store.publish("wanted", b"y").await.unwrap();
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.topic, "wanted");
        assert_eq!(msg.payload, b"y");
    }

    #[tokio::test]
    async fn append_dlq_accumulates_entries() {
        use crate::model::DlqEntry;
        let store = InMemoryCacheStore::new();
        store
            .append_dlq(&DlqEntry {
                task_kind: "enrich_tick".into(),
                task_id: "t1".into(),
                error: "boom".into(),
                args: serde_json::json!({}),
                failed_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.dlq_snapshot().len(), 1);
    }
}
