use chm_core::RngHandle;
use serde::{Deserialize, Serialize};

/// Swap statistics above this value are always accepted.
pub const SWAP_ACCEPT_ABOVE: f64 = 1.0;
/// Swap statistics below this value are always rejected.
pub const SWAP_REJECT_BELOW: f64 = -100.0;

/// Comparison applied between `exp(r)` and a uniform draw `u` when the swap
/// statistic falls between the deterministic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapRule {
    /// Metropolis rule: accept when `u < exp(r)`.
    #[default]
    Canonical,
    /// Reversed comparison: accept when `exp(r) < u`.
    Literal,
}

impl SwapRule {
    /// Applies the comparison to a uniform draw.
    pub fn accepts(self, draw: f64, ratio: f64) -> bool {
        match self {
            SwapRule::Canonical => draw < ratio,
            SwapRule::Literal => ratio < draw,
        }
    }
}

/// Heat of the chain at `index` on a ladder with spacing `delta`.
pub fn heat(delta: f64, index: usize) -> f64 {
    1.0 / (1.0 + delta * index as f64)
}

/// Heats of a ladder with `chains` entries, coldest first.
pub fn build_ladder(delta: f64, chains: usize) -> Vec<f64> {
    (0..chains).map(|index| heat(delta, index)).collect()
}

/// Log acceptance statistic for exchanging the heats of chains `j` and `k`.
pub fn swap_statistic(heat_j: f64, ln_j: f64, heat_k: f64, ln_k: f64) -> f64 {
    heat_j * ln_k + heat_k * ln_j - heat_j * ln_j - heat_k * ln_k
}

/// Draws two distinct chain indices uniformly; `None` with fewer than two chains.
pub fn pick_pair(chains: usize, rng: &mut RngHandle) -> Option<(usize, usize)> {
    if chains < 2 {
        return None;
    }
    let j = rng.index(chains);
    let mut k = rng.index(chains);
    while k == j {
        k = rng.index(chains);
    }
    Some((j, k))
}

/// Decides a swap from its statistic. A uniform variate is only drawn when
/// the statistic lies in `[-100, 1]`.
pub fn decide_swap(statistic: f64, rule: SwapRule, rng: &mut RngHandle) -> bool {
    if statistic.is_nan() {
        return false;
    }
    if statistic > SWAP_ACCEPT_ABOVE {
        return true;
    }
    if statistic < SWAP_REJECT_BELOW {
        return false;
    }
    rule.accepts(rng.uniform(), statistic.exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_starts_cold() {
        let ladder = build_ladder(0.5, 4);
        assert_eq!(ladder[0], 1.0);
        assert!((ladder[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn statistic_matches_worked_example() {
        let r = swap_statistic(1.0, -10.0, 0.5, -12.0);
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_are_deterministic() {
        let mut rng = RngHandle::from_seed(3);
        assert!(decide_swap(1.5, SwapRule::Literal, &mut rng));
        assert!(!decide_swap(-150.0, SwapRule::Canonical, &mut rng));
        assert!(!decide_swap(f64::NAN, SwapRule::Canonical, &mut rng));
    }
}
