use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::broker::{Task, TaskQueue};
use crate::cache::{typed, CacheStore};
use crate::model::{keys, topics, RawMessage};

/// §4.D: subscribes to the three raw topics, validates, and enqueues a typed
/// task. `OptionQuote` messages have no dedicated task kind (§4.C only names
/// `EnrichTick`/`EnrichChain`/`RecomputeOHLC`) so they're written straight
/// through to `latest:option:{symbol}` here rather than round-tripping the
/// broker — nothing downstream needs a quote enrichment pipeline on its own.
pub struct IngestSubscriber {
    cache: Arc<dyn CacheStore>,
    queue: Arc<dyn TaskQueue>,
    high_watermark: usize,
    low_watermark: usize,
}

impl IngestSubscriber {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn TaskQueue>,
        high_watermark: usize,
        low_watermark: usize,
    ) -> Self {
        Self {
            cache,
            queue,
            high_watermark,
            low_watermark,
        }
    }

    /// Runs until the subscription closes (bus shutdown). Pauses consumption
    /// when `queue.pending_len()` crosses `high_watermark`, resumes once it
    /// falls back to `low_watermark` (§4.D backpressure).
    pub async fn run(self: Arc<Self>) {
        let mut sub = match self
            .cache
            .subscribe(&[
                topics::MARKET_UNDERLYING,
                topics::MARKET_OPTION_CHAIN,
                topics::MARKET_OPTION_QUOTE,
            ])
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "ingest subscriber failed to subscribe, exiting");
                return;
            }
        };

        let mut paused = false;
        loop {
            if paused {
                match self.queue.pending_len().await {
                    Ok(depth) if depth <= self.low_watermark => {
                        info!(depth, "ingest backpressure resumed");
                        paused = false;
                    }
                    Ok(_) => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed polling queue depth during backpressure pause");
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        continue;
                    }
                }
            }

            let Some(msg) = sub.recv().await else {
                info!("ingest bus subscription closed, stopping");
                break;
            };
            self.handle_message(msg.topic, msg.payload).await;

            if let Ok(depth) = self.queue.pending_len().await {
                if depth >= self.high_watermark {
                    warn!(depth, "ingest backpressure triggered, pausing consumption");
                    paused = true;
                }
            }
        }
    }

    async fn handle_message(&self, topic: String, payload: Vec<u8>) {
        let decoded = match RawMessage::decode(&topic, &payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(topic, error = %e, "dropping invalid raw message");
                return;
            }
        };

        match decoded {
            RawMessage::UnderlyingTick(tick) => {
                if let Err(e) = self.queue.enqueue(Task::EnrichTick(tick)).await {
                    warn!(error = %e, "failed to enqueue EnrichTick");
                }
            }
            msg @ RawMessage::OptionChain(_) => match msg.into_option_chain() {
                Ok(chain) => {
                    if let Err(e) = self.queue.enqueue(Task::EnrichChain(chain)).await {
                        warn!(error = %e, "failed to enqueue EnrichChain");
                    }
                }
                Err(e) => warn!(error = %e, "rejected option_chain envelope"),
            },
            RawMessage::OptionQuote(quote) => {
                let key = keys::latest_option(&quote.symbol);
                if let Err(e) =
                    typed::put_with_ttl(self.cache.as_ref(), &key, &quote, Duration::from_secs(300)).await
                {
                    warn!(error = %e, symbol = %quote.symbol, "failed to cache latest option quote");
                }
            }
        }
    }
}
