use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::model::{OptionChain, OptionQuote};

/// A ratio result plus the "undefined" flag spec §4.A requires when the
/// denominator is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcrResult {
    pub value: Decimal,
    pub undefined: bool,
}

fn round4(d: Decimal) -> Decimal {
    d.round_dp(4)
}

/// `pcr_oi = sum(put.open_interest) / sum(call.open_interest)`, 0 + flagged
/// undefined when the denominator is 0.
pub fn pcr_oi(chain: &OptionChain) -> PcrResult {
    let put_oi: i64 = chain.puts.iter().map(|q| q.open_interest).sum();
    let call_oi: i64 = chain.calls.iter().map(|q| q.open_interest).sum();
    ratio(put_oi, call_oi)
}

/// `pcr_volume = sum(put.volume) / sum(call.volume)`.
pub fn pcr_volume(chain: &OptionChain) -> PcrResult {
    let put_vol: i64 = chain.puts.iter().map(|q| q.volume).sum();
    let call_vol: i64 = chain.calls.iter().map(|q| q.volume).sum();
    ratio(put_vol, call_vol)
}

fn ratio(numerator: i64, denominator: i64) -> PcrResult {
    if denominator == 0 {
        return PcrResult {
            value: dec!(0),
            undefined: true,
        };
    }
    PcrResult {
        value: round4(Decimal::from(numerator) / Decimal::from(denominator)),
        undefined: false,
    }
}

/// Sum helper shared by callers that just want the totals without the ratio
/// (e.g. §4.A OI buildup's `total_call_oi`/`total_put_oi`).
pub fn sum_open_interest(quotes: &[OptionQuote]) -> i64 {
    quotes.iter().map(|q| q.open_interest).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests_support::two_strike_chain;

    #[test]
    fn pcr_oi_matches_e2e3() {
        let chain = two_strike_chain();
        let r = pcr_oi(&chain);
        assert!(!r.undefined);
        assert_eq!(r.value, dec!(0.75));
    }

    #[test]
    fn zero_call_oi_is_undefined() {
        let mut chain = two_strike_chain();
        for c in chain.calls.iter_mut() {
            c.open_interest = 0;
        }
        let r = pcr_oi(&chain);
        assert!(r.undefined);
        assert_eq!(r.value, dec!(0));
    }
}
