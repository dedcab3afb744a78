use rust_decimal::Decimal;

use crate::model::OptionChain;

/// Aggregate payout to option holders if the underlying settles at `k`.
/// O(|strikes|) per call, O(|strikes|^2) total across all candidates — spec
/// §4.A accepts this; an O(n) prefix-sum form exists (running OI sums split
/// at each strike) but isn't needed at the chain sizes this pipeline sees.
fn pain(chain: &OptionChain, k: i64) -> i64 {
    let mut total = 0i64;
    for c in &chain.calls {
        total += c.open_interest * (k - c.strike).max(0);
    }
    for p in &chain.puts {
        total += p.open_interest * (p.strike - k).max(0);
    }
    total
}

/// `argmin over K in strikes of pain(K)`. Ties broken by distance to spot,
/// then by the lower strike.
pub fn max_pain_strike(chain: &OptionChain) -> i64 {
    let spot = chain.spot_price;
    *chain
        .strikes
        .iter()
        .min_by(|&&a, &&b| {
            let pain_a = pain(chain, a);
            let pain_b = pain(chain, b);
            pain_a
                .cmp(&pain_b)
                .then_with(|| {
                    let da = (Decimal::from(a) - spot).abs();
                    let db = (Decimal::from(b) - spot).abs();
                    da.cmp(&db)
                })
                .then_with(|| a.cmp(&b))
        })
        .expect("chain has at least one strike")
}
