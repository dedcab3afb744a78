use rust_decimal_macros::dec;

use crate::model::{IvSurfacePoint, OptionChain};

/// Assemble the IV surface points contributed by one (product, expiry)
/// chain. Per-strike value is the mean of the call and put IV at that strike
/// (see DESIGN.md). Output is sorted by strike. `iv_surface:{P}` (§4.B) holds
/// the union of every known expiry's points, not just this chain's — the
/// worker (`EnrichmentRunner::rebuild_iv_surface`) is responsible for merging
/// this function's per-chain output across all of a product's expiries
/// before writing the key.
pub fn assemble_iv_surface(chain: &OptionChain) -> Vec<IvSurfacePoint> {
    let mut points: Vec<IvSurfacePoint> = chain
        .strikes
        .iter()
        .enumerate()
        .map(|(i, &strike)| {
            let iv = (chain.calls[i].iv + chain.puts[i].iv) / dec!(2);
            IvSurfacePoint {
                expiry: chain.expiry,
                strike,
                iv,
            }
        })
        .collect();
    points.sort_by_key(|p| p.strike);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests_support::two_strike_chain;

    #[test]
    fn one_point_per_strike_sorted_ascending() {
        let chain = two_strike_chain();
        let surface = assemble_iv_surface(&chain);
        assert_eq!(surface.len(), 2);
        assert!(surface[0].strike < surface[1].strike);
    }
}
