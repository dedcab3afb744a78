use crate::model::OptionChain;

/// `(total_call_oi, total_put_oi)` — simple sums.
pub fn total_oi(chain: &OptionChain) -> (i64, i64) {
    let calls = chain.calls.iter().map(|q| q.open_interest).sum();
    let puts = chain.puts.iter().map(|q| q.open_interest).sum();
    (calls, puts)
}

/// `(call_buildup_otm, put_buildup_otm)`: OI in strikes that are currently
/// out-of-the-money for each side.
pub fn oi_buildup_otm(chain: &OptionChain) -> (i64, i64) {
    let spot = chain.spot_price;
    let call_buildup = chain
        .calls
        .iter()
        .filter(|q| rust_decimal::Decimal::from(q.strike) > spot)
        .map(|q| q.open_interest)
        .sum();
    let put_buildup = chain
        .puts
        .iter()
        .filter(|q| rust_decimal::Decimal::from(q.strike) < spot)
        .map(|q| q.open_interest)
        .sum();
    (call_buildup, put_buildup)
}
