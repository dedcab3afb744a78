use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OhlcWindow, Product};

/// An underlying price tick. `(product, tick_id)` is unique across the
/// lifetime of the pipeline — the ingest side assigns `tick_id` monotonically
/// per product; this struct never re-derives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingTick {
    pub product: Product,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub tick_id: i64,
}

/// The three windows tracked per product, keyed by their width in seconds to
/// match the `enriched:underlying` wire shape from §6 (`{60: ..., 300: ...,
/// 900: ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcWindows {
    #[serde(rename = "60")]
    pub w60: OhlcWindow,
    #[serde(rename = "300")]
    pub w300: OhlcWindow,
    #[serde(rename = "900")]
    pub w900: OhlcWindow,
}

/// `enriched:underlying` publish payload (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedUnderlying {
    #[serde(flatten)]
    pub tick: UnderlyingTick,
    pub ohlc: OhlcWindows,
    pub processed_at: DateTime<Utc>,
}
