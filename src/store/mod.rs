//! §4.G document store — collections `underlying_ticks`, `option_quotes`,
//! `option_chains`, each idempotent via a unique index.

mod sqlite_store;

pub use sqlite_store::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::PipelineError;
use crate::model::{EnrichedChain, OptionQuote, Product, UnderlyingTick};

/// Whether an insert actually wrote a new row or hit the unique index and
/// was treated as idempotent success (spec §4.C steps 2/3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateIgnored,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create tables/indices if absent. Idempotent, called once at startup.
    async fn ensure_schema(&self) -> Result<(), PipelineError>;

    async fn insert_tick(&self, tick: &UnderlyingTick) -> Result<InsertOutcome, PipelineError>;
    async fn insert_quote(&self, quote: &OptionQuote) -> Result<InsertOutcome, PipelineError>;
    async fn insert_chain(&self, chain: &EnrichedChain) -> Result<InsertOutcome, PipelineError>;

    async fn query_ticks(
        &self,
        product: &Product,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<UnderlyingTick>, PipelineError>;

    async fn query_chains(
        &self,
        product: &Product,
        expiry: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<EnrichedChain>, PipelineError>;

    /// Distinct products seen across `underlying_ticks` (§6 `/products`).
    async fn list_products(&self) -> Result<Vec<Product>, PipelineError>;

    /// Distinct expiries for a product, ascending (§6 `/option/expiries/{product}`).
    async fn list_expiries(&self, product: &Product) -> Result<Vec<NaiveDate>, PipelineError>;

    /// Cheap reachability probe for `/health`.
    async fn ping(&self) -> Result<(), PipelineError>;
}
