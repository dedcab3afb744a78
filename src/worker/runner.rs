use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::ohlc_guard::OhlcGuard;
use crate::analytics;
use crate::broker::Task;
use crate::cache::{typed, CacheStore, MarkResult};
use crate::error::PipelineError;
use crate::model::{
    idempotency, keys, topics, EnrichedChain, EnrichedUnderlying, OhlcWindow, OhlcWindows,
    OptionChain, OptionQuote, Product, UnderlyingTick, WindowSize,
};
use crate::store::DocumentStore;

const IDEMPOTENCY_TTL: Duration = Duration::from_secs(3600);
const LATEST_TTL: Duration = Duration::from_secs(300);

/// Executes one task to completion (§4.C). Callers (the worker pool loop)
/// own ack/nack and retry bookkeeping — `process` only ever returns `Ok(())`
/// on a successful or idempotent-no-op path, or `Err` for the retry/DLQ
/// layer to classify.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn process(&self, task: &Task) -> Result<(), PipelineError>;
}

pub struct EnrichmentRunner {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn DocumentStore>,
    ohlc_guard: Arc<OhlcGuard>,
}

impl EnrichmentRunner {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn DocumentStore>, ohlc_guard: Arc<OhlcGuard>) -> Self {
        Self {
            cache,
            store,
            ohlc_guard,
        }
    }

    async fn enrich_tick(&self, tick: &UnderlyingTick) -> Result<(), PipelineError> {
        // Unique-constraint violation is treated as idempotent success; our
        // `InsertOutcome::DuplicateIgnored` already models that, so no
        // special-casing is needed here. This effect (and the cache writes
        // below) must land *before* the idempotency mark, so a crash between
        // this write and the publish still lets redelivery reach the publish
        // instead of short-circuiting on a key that was already set.
        self.store.insert_tick(tick).await?;

        typed::put_with_ttl(
            self.cache.as_ref(),
            &keys::latest_underlying(&tick.product),
            tick,
            LATEST_TTL,
        )
        .await?;

        let w60 = self.apply_ohlc_tick(&tick.product, WindowSize::OneMinute, tick).await?;
        let w300 = self.apply_ohlc_tick(&tick.product, WindowSize::FiveMinute, tick).await?;
        let w900 = self.apply_ohlc_tick(&tick.product, WindowSize::FifteenMinute, tick).await?;

        // Single-flight guard around the one non-idempotent effect: only the
        // attempt that actually wins the mark gets to publish. A tick whose
        // processing crashed after the store insert but before this point
        // still publishes on redelivery, since nothing marked it done yet.
        let idem_key = idempotency::tick_key(&tick.product, tick.tick_id);
        if self.cache.try_mark_once(&idem_key, IDEMPOTENCY_TTL).await? == MarkResult::AlreadySet {
            debug!(product = %tick.product, tick_id = tick.tick_id, "tick already published, skipping duplicate publish");
            return Ok(());
        }

        let enriched = EnrichedUnderlying {
            tick: tick.clone(),
            ohlc: OhlcWindows { w60, w300, w900 },
            processed_at: Utc::now(),
        };
        typed::publish(self.cache.as_ref(), topics::ENRICHED_UNDERLYING, &enriched).await
    }

    /// One OHLC window update under the per-(product, window) serialization
    /// guard (§5). The cache read-modify-write happens entirely inside the
    /// lock so two concurrent ticks for the same window never race.
    async fn apply_ohlc_tick(
        &self,
        product: &Product,
        window: WindowSize,
        tick: &UnderlyingTick,
    ) -> Result<OhlcWindow, PipelineError> {
        let cache = self.cache.clone();
        let product_owned = product.clone();
        let price = tick.price;
        let timestamp = tick.timestamp;

        self.ohlc_guard
            .with_lock(product, window, move || async move {
                let key = keys::ohlc(&product_owned, window);
                let existing: Option<OhlcWindow> = typed::get(cache.as_ref(), &key).await?;
                let updated = analytics::update_ohlc_window(existing, &product_owned, window, price, timestamp);
                typed::put_with_ttl(cache.as_ref(), &key, &updated, Duration::from_secs(window.as_secs() as u64))
                    .await?;
                Ok::<OhlcWindow, PipelineError>(updated)
            })
            .await
    }

    async fn enrich_chain(&self, chain: &OptionChain) -> Result<(), PipelineError> {
        let pcr_oi = analytics::pcr_oi(chain);
        let pcr_volume = analytics::pcr_volume(chain);
        let atm_strike = analytics::atm_strike(chain);
        let atm_straddle_price = analytics::atm_straddle(chain, atm_strike).unwrap_or_default();
        let max_pain_strike = analytics::max_pain_strike(chain);
        let (total_call_oi, total_put_oi) = analytics::total_oi(chain);
        let (call_buildup_otm, put_buildup_otm) = analytics::oi_buildup_otm(chain);

        let enriched = EnrichedChain {
            chain: chain.clone(),
            pcr_oi: pcr_oi.value,
            pcr_oi_undefined: pcr_oi.undefined,
            pcr_volume: pcr_volume.value,
            pcr_volume_undefined: pcr_volume.undefined,
            atm_strike,
            atm_straddle_price,
            max_pain_strike,
            total_call_oi,
            total_put_oi,
            call_buildup_otm,
            put_buildup_otm,
            processed_at: Utc::now(),
        };

        self.store.insert_chain(&enriched).await?;
        for quote in chain.calls.iter().chain(chain.puts.iter()) {
            self.store.insert_quote(quote).await?;
        }

        typed::put_with_ttl(
            self.cache.as_ref(),
            &keys::latest_chain(&chain.product, &chain.expiry),
            &enriched,
            LATEST_TTL,
        )
        .await?;
        typed::put_with_ttl(
            self.cache.as_ref(),
            &keys::latest_pcr(&chain.product, &chain.expiry),
            &PcrSubset {
                pcr_oi: enriched.pcr_oi,
                pcr_oi_undefined: enriched.pcr_oi_undefined,
                pcr_volume: enriched.pcr_volume,
                pcr_volume_undefined: enriched.pcr_volume_undefined,
            },
            LATEST_TTL,
        )
        .await?;

        self.rebuild_iv_surface(&chain.product, &enriched).await?;

        // Single-flight guard around the one non-idempotent effect, mirroring
        // `enrich_tick`: mark only after every durable effect above has
        // landed, so a crash before this point still lets redelivery publish
        // exactly once instead of finding the key already set.
        let hash = chain.identity_hash();
        let idem_key = idempotency::chain_key(&chain.product, &chain.expiry, &hash);
        if self.cache.try_mark_once(&idem_key, IDEMPOTENCY_TTL).await? == MarkResult::AlreadySet {
            debug!(product = %chain.product, expiry = %chain.expiry, "chain already published, skipping duplicate publish");
            return Ok(());
        }

        typed::publish(self.cache.as_ref(), topics::ENRICHED_OPTION_CHAIN, &enriched).await
    }

    /// Recomputes `iv_surface:{product}` as the union of IV points across
    /// every expiry the store knows about for `product` (§4.C step 5), not
    /// just the expiry just processed. `current` supplies this call's own
    /// chain directly (its cache/store writes may not be visible to a
    /// following read yet); every other known expiry is read back from the
    /// cache's `latest:chain` entry, falling back to the store if the cache
    /// entry has expired or was never set.
    async fn rebuild_iv_surface(&self, product: &Product, current: &EnrichedChain) -> Result<(), PipelineError> {
        let expiries = self.store.list_expiries(product).await?;
        let mut points = Vec::new();

        for expiry in expiries {
            if expiry == current.chain.expiry {
                points.extend(analytics::assemble_iv_surface(&current.chain));
                continue;
            }

            let cached: Option<EnrichedChain> =
                typed::get(self.cache.as_ref(), &keys::latest_chain(product, &expiry)).await?;
            let chain = match cached {
                Some(enriched) => Some(enriched.chain),
                None => self
                    .store
                    .query_chains(product, Some(expiry), 1)
                    .await?
                    .into_iter()
                    .next()
                    .map(|enriched| enriched.chain),
            };
            if let Some(chain) = chain {
                points.extend(analytics::assemble_iv_surface(&chain));
            }
        }

        points.sort_by(|a, b| a.expiry.cmp(&b.expiry).then(a.strike.cmp(&b.strike)));
        typed::put_with_ttl(self.cache.as_ref(), &keys::iv_surface(product), &points, LATEST_TTL).await
    }

    /// Operator-triggered repair path (§4.C): recompute one window purely
    /// from store history rather than the inline ingest path.
    async fn recompute_ohlc(
        &self,
        product: &Product,
        window: WindowSize,
        t_start: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        // A window holds at most one tick per millisecond; this comfortably
        // bounds any real window's tick count without relying on "no limit".
        const MAX_TICKS_PER_WINDOW: usize = 1_000_000;
        let t_end = t_start + chrono::Duration::seconds(window.as_secs());
        let ticks = self
            .store
            .query_ticks(product, Some(t_start), Some(t_end), MAX_TICKS_PER_WINDOW)
            .await?;
        if ticks.is_empty() {
            return Ok(());
        }

        let mut recomputed: Option<OhlcWindow> = None;
        for tick in ticks.iter().rev() {
            recomputed = Some(analytics::update_ohlc_window(
                recomputed,
                product,
                window,
                tick.price,
                tick.timestamp,
            ));
        }

        if let Some(window_value) = recomputed {
            self.ohlc_guard
                .with_lock(product, window, || async move {
                    typed::put_with_ttl(
                        self.cache.as_ref(),
                        &keys::ohlc(product, window),
                        &window_value,
                        Duration::from_secs(window.as_secs() as u64),
                    )
                    .await
                })
                .await?;
        }
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PcrSubset {
    pcr_oi: rust_decimal::Decimal,
    pcr_oi_undefined: bool,
    pcr_volume: rust_decimal::Decimal,
    pcr_volume_undefined: bool,
}

#[async_trait]
impl TaskRunner for EnrichmentRunner {
    async fn process(&self, task: &Task) -> Result<(), PipelineError> {
        match task {
            Task::EnrichTick(tick) => self.enrich_tick(tick).await,
            Task::EnrichChain(chain) => self.enrich_chain(chain).await,
            Task::RecomputeOhlc { product, window, t_start } => {
                self.recompute_ohlc(product, *window, *t_start).await
            }
        }
    }
}
