use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quote::OptionQuote;
use super::Product;

/// Atomic snapshot of one expiry of one product.
///
/// Invariant (§3): `calls[i].strike == puts[i].strike == strikes[i]` for all
/// `i`, and `|calls| == |puts| == |strikes|`. Construction goes through
/// `OptionChain::new`, which is the only place this invariant is checked;
/// everything downstream trusts it once a value exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub product: Product,
    pub expiry: NaiveDate,
    pub spot_price: Decimal,
    pub strikes: Vec<i64>,
    pub calls: Vec<OptionQuote>,
    pub puts: Vec<OptionQuote>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStructureError;

impl std::fmt::Display for ChainStructureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chain structural invariant violated: |calls| != |puts| != |strikes|, or strike alignment mismatch")
    }
}

impl OptionChain {
    /// Validates the §3 structural invariant before constructing. This is
    /// the only entry point ingest/worker code should use to build a chain
    /// from untrusted input.
    pub fn new(
        product: Product,
        expiry: NaiveDate,
        spot_price: Decimal,
        strikes: Vec<i64>,
        calls: Vec<OptionQuote>,
        puts: Vec<OptionQuote>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ChainStructureError> {
        if calls.len() != strikes.len() || puts.len() != strikes.len() {
            return Err(ChainStructureError);
        }
        for i in 0..strikes.len() {
            if calls[i].strike != strikes[i] || puts[i].strike != strikes[i] {
                return Err(ChainStructureError);
            }
        }
        Ok(Self {
            product,
            expiry,
            spot_price,
            strikes,
            calls,
            puts,
            timestamp,
        })
    }

    /// Stable chain-identity hash for the idempotency key (§4.C step 1,
    /// decided in DESIGN.md): SHA-256 over a canonical JSON encoding of
    /// `(product, expiry, timestamp, strikes, calls[].last, puts[].last,
    /// calls[].open_interest, puts[].open_interest)`, hex-encoded.
    pub fn identity_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let call_lasts: Vec<Decimal> = self.calls.iter().map(|q| q.last).collect();
        let put_lasts: Vec<Decimal> = self.puts.iter().map(|q| q.last).collect();
        let call_ois: Vec<i64> = self.calls.iter().map(|q| q.open_interest).collect();
        let put_ois: Vec<i64> = self.puts.iter().map(|q| q.open_interest).collect();

        let tuple = (
            &self.product,
            &self.expiry,
            &self.timestamp,
            &self.strikes,
            &call_lasts,
            &put_lasts,
            &call_ois,
            &put_ois,
        );
        let canonical = serde_json::to_vec(&tuple).expect("tuple of plain data always serializes");

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    pub fn check_invariant(&self) -> Result<(), ChainStructureError> {
        if self.calls.len() != self.strikes.len() || self.puts.len() != self.strikes.len() {
            return Err(ChainStructureError);
        }
        for i in 0..self.strikes.len() {
            if self.calls[i].strike != self.strikes[i] || self.puts[i].strike != self.strikes[i] {
                return Err(ChainStructureError);
            }
        }
        Ok(())
    }
}

/// `OptionChain` plus the analytics fields §3/§4.A derive from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedChain {
    #[serde(flatten)]
    pub chain: OptionChain,

    pub pcr_oi: Decimal,
    pub pcr_oi_undefined: bool,
    pub pcr_volume: Decimal,
    pub pcr_volume_undefined: bool,

    pub atm_strike: i64,
    pub atm_straddle_price: Decimal,

    pub max_pain_strike: i64,

    pub total_call_oi: i64,
    pub total_put_oi: i64,
    pub call_buildup_otm: i64,
    pub put_buildup_otm: i64,

    pub processed_at: DateTime<Utc>,
}

/// `(product, expiry, strike, iv)`. A surface is a collection sorted by
/// `(expiry, strike)`; `IvSurface` below is that collection, queryable by
/// strike range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvSurfacePoint {
    pub expiry: NaiveDate,
    pub strike: i64,
    pub iv: Decimal,
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::two_strike_chain;

    #[test]
    fn identity_hash_is_deterministic_and_changes_with_data() {
        let chain = two_strike_chain();
        let h1 = chain.identity_hash();
        let h2 = chain.identity_hash();
        assert_eq!(h1, h2);

        let mut mutated = chain.clone();
        mutated.spot_price += rust_decimal_macros::dec!(1);
        // spot_price isn't in the hashed tuple, so this must NOT change the hash.
        assert_eq!(mutated.identity_hash(), h1);

        let mut different = chain.clone();
        different.calls[0].last += rust_decimal_macros::dec!(5);
        assert_ne!(different.identity_hash(), h1);
    }
}
