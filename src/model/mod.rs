//! §3 data model.

mod chain;
mod dlq;
mod ohlc;
mod quote;
mod raw;
mod tick;

pub use chain::{EnrichedChain, IvSurfacePoint, OptionChain};
pub use dlq::DlqEntry;
pub use ohlc::{OhlcWindow, WindowSize};
pub use quote::{Greeks, OptionQuote, OptionType};
pub use raw::RawMessage;
pub use tick::{EnrichedUnderlying, OhlcWindows, UnderlyingTick};

/// Underlying instrument identifier, e.g. "NIFTY". Immutable once constructed.
pub type Product = String;

/// Idempotency-key construction, centralized so every caller derives the
/// same string for the same entity (spec §3/§4.B key grammar).
pub mod idempotency {
    use super::Product;

    pub fn tick_key(product: &Product, tick_id: i64) -> String {
        format!("processed:underlying:{product}:{tick_id}")
    }

    pub fn chain_key(product: &Product, expiry: &chrono::NaiveDate, chain_hash: &str) -> String {
        format!("processed:chain:{product}:{expiry}:{chain_hash}")
    }
}

/// Cache/store key grammar (spec §4.B table), centralized so adapters and
/// callers never hand-format a key inconsistently.
pub mod keys {
    use super::Product;
    use super::WindowSize;

    pub fn latest_underlying(product: &Product) -> String {
        format!("latest:underlying:{product}")
    }

    pub fn latest_option(symbol: &str) -> String {
        format!("latest:option:{symbol}")
    }

    pub fn latest_chain(product: &Product, expiry: &chrono::NaiveDate) -> String {
        format!("latest:chain:{product}:{expiry}")
    }

    pub fn latest_pcr(product: &Product, expiry: &chrono::NaiveDate) -> String {
        format!("latest:pcr:{product}:{expiry}")
    }

    pub fn ohlc(product: &Product, window: WindowSize) -> String {
        format!("ohlc:{product}:{}", window.as_secs())
    }

    pub fn iv_surface(product: &Product) -> String {
        format!("iv_surface:{product}")
    }

    pub const DLQ_ENRICHMENT: &str = "dlq:enrichment";
}

/// Shared fixtures for analytics/worker unit tests, built from the E2E-3
/// scenario in spec §8 so every kernel test exercises the same numbers the
/// spec worked out by hand.
#[cfg(test)]
pub mod tests_support {
    use super::chain::OptionChain;
    use super::quote::{Greeks, OptionQuote, OptionType};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn quote(
        product: &str,
        expiry: NaiveDate,
        option_type: OptionType,
        strike: i64,
        last: rust_decimal::Decimal,
        oi: i64,
    ) -> OptionQuote {
        OptionQuote {
            symbol: OptionQuote::canonical_symbol(&product.to_string(), expiry, option_type, strike),
            product: product.to_string(),
            strike,
            expiry,
            option_type,
            bid: last - dec!(1),
            ask: last + dec!(1),
            last,
            volume: 10,
            open_interest: oi,
            greeks: Greeks {
                delta: dec!(0.5),
                gamma: dec!(0.01),
                vega: dec!(0.1),
                theta: dec!(-0.05),
            },
            iv: dec!(0.2),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    /// The two-strike chain from E2E-3: strikes=[21500,21600],
    /// calls=[{oi:100,last:70},{oi:300,last:20}],
    /// puts=[{oi:200,last:60},{oi:100,last:120}], spot=21543.25.
    pub fn two_strike_chain() -> OptionChain {
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 30).unwrap();
        let calls = vec![
            quote("NIFTY", expiry, OptionType::Call, 21500, dec!(70), 100),
            quote("NIFTY", expiry, OptionType::Call, 21600, dec!(20), 300),
        ];
        let puts = vec![
            quote("NIFTY", expiry, OptionType::Put, 21500, dec!(60), 200),
            quote("NIFTY", expiry, OptionType::Put, 21600, dec!(120), 100),
        ];
        OptionChain::new(
            "NIFTY".to_string(),
            expiry,
            dec!(21543.25),
            vec![21500, 21600],
            calls,
            puts,
            Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap(),
        )
        .expect("fixture satisfies structural invariant")
    }
}

/// Raw/enriched pub/sub topic names (spec §6).
pub mod topics {
    pub const MARKET_UNDERLYING: &str = "market:underlying";
    pub const MARKET_OPTION_CHAIN: &str = "market:option_chain";
    pub const MARKET_OPTION_QUOTE: &str = "market:option_quote";

    pub const ENRICHED_UNDERLYING: &str = "enriched:underlying";
    pub const ENRICHED_OPTION_CHAIN: &str = "enriched:option_chain";
}
