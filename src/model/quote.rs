use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

/// Informational Greeks, passed through verbatim from the upstream feed.
/// Spec §9 explicitly leaves accurate Greeks out of scope for this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub vega: Decimal,
    pub theta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Canonical symbol: `{product}{YYYYMMDD}{C|P}{strike}`.
    pub symbol: String,
    pub product: Product,
    pub strike: i64,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: i64,
    pub open_interest: i64,
    pub greeks: Greeks,
    pub iv: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OptionQuote {
    /// Build the canonical symbol for a quote's identity.
    pub fn canonical_symbol(
        product: &Product,
        expiry: NaiveDate,
        option_type: OptionType,
        strike: i64,
    ) -> String {
        let type_char = match option_type {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        };
        format!("{product}{}{type_char}{strike}", expiry.format("%Y%m%d"))
    }

    /// §3 invariant: bid <= last <= ask. Negative OI/volume are also rejected
    /// by the ingest validator (§4.D), not by this check.
    pub fn satisfies_price_ordering(&self) -> bool {
        self.bid <= self.last && self.last <= self.ask
    }
}
