mod common;

use chm_core::RngHandle;
use chm_mcmc::tempering::{self, SwapRule};
use chm_mcmc::{Chain, CoupledScheduler};
use common::{options, Gaussian};
use proptest::prelude::*;

fn pair(x_cold: f64, x_hot: f64, rule: SwapRule) -> CoupledScheduler<Gaussian> {
    let chains = vec![
        Chain::new(Gaussian { x: x_cold }),
        Chain::new(Gaussian { x: x_hot }),
    ];
    let mut options = options(1.0, 1, 99);
    options.swap_rule = rule;
    CoupledScheduler::new(chains, options).unwrap()
}

proptest! {
    #[test]
    fn ladder_is_strictly_decreasing(delta in 0.01f64..5.0, chains in 2usize..12) {
        let ladder = tempering::build_ladder(delta, chains);
        prop_assert_eq!(ladder[0], 1.0);
        for window in ladder.windows(2) {
            prop_assert!(window[1] < window[0]);
            prop_assert!(window[1] > 0.0);
        }
    }

    #[test]
    fn pairs_are_distinct(chains in 2usize..16, seed in any::<u64>()) {
        let mut rng = RngHandle::from_seed(seed);
        for _ in 0..32 {
            let (j, k) = tempering::pick_pair(chains, &mut rng).unwrap();
            prop_assert_ne!(j, k);
            prop_assert!(j < chains && k < chains);
        }
    }
}

#[test]
fn fewer_than_two_chains_have_no_pair() {
    let mut rng = RngHandle::from_seed(5);
    assert!(tempering::pick_pair(0, &mut rng).is_none());
    assert!(tempering::pick_pair(1, &mut rng).is_none());
}

#[test]
fn rules_disagree_inside_the_stochastic_band() {
    for (seed, statistic) in [(1u64, -2.0), (2, -0.5), (3, 0.0), (4, 0.7), (5, -50.0)] {
        let mut canonical_rng = RngHandle::from_seed(seed);
        let mut literal_rng = RngHandle::from_seed(seed);
        let canonical = tempering::decide_swap(statistic, SwapRule::Canonical, &mut canonical_rng);
        let literal = tempering::decide_swap(statistic, SwapRule::Literal, &mut literal_rng);
        assert_ne!(canonical, literal, "statistic {statistic}");
    }
}

#[test]
fn favourable_swap_exchanges_heat_and_active_flag() {
    // cold chain at ln L = -10, hot chain at ln L = 0: r = 10 * (1 - 0.5) = 5
    for rule in [SwapRule::Canonical, SwapRule::Literal] {
        let mut scheduler = pair(20.0f64.sqrt(), 0.0, rule);
        assert!(scheduler.swap());
        let chains = scheduler.chains();
        assert_eq!(chains[0].heat(), 0.5);
        assert_eq!(chains[1].heat(), 1.0);
        assert!(!chains[0].is_active());
        assert!(chains[1].is_active());
        assert_eq!(scheduler.swap_stats().accepted, 1);
    }
}

#[test]
fn hopeless_swap_is_rejected_under_both_rules() {
    // cold at 0, hot at -300: r = -300 + 150 = -150
    for rule in [SwapRule::Canonical, SwapRule::Literal] {
        let mut scheduler = pair(0.0, 600.0f64.sqrt(), rule);
        assert!(!scheduler.swap());
        let chains = scheduler.chains();
        assert_eq!(chains[0].heat(), 1.0);
        assert!(chains[0].is_active());
        assert_eq!(scheduler.swap_stats().attempted, 1);
        assert_eq!(scheduler.swap_stats().accepted, 0);
    }
}

#[test]
fn ladder_tuning_keeps_the_cold_chain_cold() {
    let mut scheduler = pair(20.0f64.sqrt(), 0.0, SwapRule::Canonical);
    assert!(scheduler.swap());
    let delta = scheduler.tune_ladder(0.6);
    assert!((delta - 1.0 * (1.0 + 0.16 / 0.56)).abs() < 1e-12);
    let chains = scheduler.chains();
    assert_eq!(chains[1].heat(), 1.0);
    assert!((chains[0].heat() - 1.0 / (1.0 + delta)).abs() < 1e-12);
    assert!(chains[1].is_active());
}
