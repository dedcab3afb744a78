use rust_decimal::Decimal;

use crate::model::OptionChain;

/// `argmin over strikes of |strike - spot_price|`, lower strike wins ties.
pub fn atm_strike(chain: &OptionChain) -> i64 {
    let spot = chain.spot_price;
    *chain
        .strikes
        .iter()
        .min_by(|a, b| {
            let da = (Decimal::from(**a) - spot).abs();
            let db = (Decimal::from(**b) - spot).abs();
            da.cmp(&db).then_with(|| a.cmp(b))
        })
        .expect("chain has at least one strike")
}

/// `call[atm].last + put[atm].last`, rounded to 2 decimals. Returns `None`
/// if the ATM strike cannot be located in `calls`/`puts` (should not happen
/// for a structurally-valid chain; callers treat `None` as a permanent
/// failure, not a transient one).
pub fn atm_straddle(chain: &OptionChain, atm: i64) -> Option<Decimal> {
    let idx = chain.strikes.iter().position(|&s| s == atm)?;
    Some((chain.calls[idx].last + chain.puts[idx].last).round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests_support::two_strike_chain;
    use rust_decimal_macros::dec;

    #[test]
    fn atm_is_closer_strike() {
        let chain = two_strike_chain();
        assert_eq!(atm_strike(&chain), 21500);
    }

    #[test]
    fn straddle_sums_last_prices() {
        let chain = two_strike_chain();
        let atm = atm_strike(&chain);
        assert_eq!(atm_straddle(&chain, atm), Some(dec!(130)));
    }

    #[test]
    fn tie_breaks_to_lower_strike() {
        let mut chain = two_strike_chain();
        chain.spot_price = dec!(21550); // equidistant from 21500 and 21600
        assert_eq!(atm_strike(&chain), 21500);
    }
}
