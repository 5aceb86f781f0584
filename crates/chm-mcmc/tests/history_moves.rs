mod common;

use chm_core::RngHandle;
use chm_ctmc::{BranchHistory, HistoryCtmc};
use chm_mcmc::{
    kernel, ClockPrior, ClockScaleMove, HistoryModel, Model, Move, NodeResampleMove,
    PathResampleMove, RunConfig, TipResampleMove,
};
use common::{ambiguous_ctmc, observed_ctmc};

fn model_from(mut ctmc: HistoryCtmc, seed: u64) -> HistoryModel {
    ctmc.initialize(&mut RngHandle::from_seed(seed)).unwrap();
    HistoryModel::new(ctmc, ClockPrior::Exponential { rate: 1.0 }).unwrap()
}

fn initialised_model(seed: u64) -> HistoryModel {
    model_from(observed_ctmc(), seed)
}

fn snapshot(model: &HistoryModel) -> Vec<BranchHistory> {
    model.ctmc().histories().to_vec()
}

fn exercise(mv: &mut dyn Move<HistoryModel>, seed: u64) {
    exercise_on(mv, initialised_model(seed), seed);
}

fn exercise_on(mv: &mut dyn Move<HistoryModel>, mut model: HistoryModel, seed: u64) {
    let mut rng = RngHandle::from_seed(seed + 1000);
    assert!(model.ln_posterior().is_finite());
    for round in 0..40 {
        let before = snapshot(&model);
        let rate = model.clock_rate();
        let ln_before = model.ln_posterior();
        let proposed = mv.propose(&mut model, &mut rng);
        if let Err(err) = &proposed {
            assert!(err.is_recoverable());
        }
        if proposed.is_err() || round % 2 == 0 {
            mv.reject(&mut model);
            assert_eq!(snapshot(&model), before);
            assert_eq!(model.clock_rate(), rate);
            assert_eq!(model.ln_posterior(), ln_before);
        } else {
            assert!(!proposed.unwrap().is_nan());
            mv.accept(&mut model);
            assert!(model.ctmc().histories().iter().all(|h| h.is_consistent()));
            assert!(model.ln_posterior().is_finite(), "{} round {round}", mv.name());
        }
    }
}

#[test]
fn path_move_restores_on_reject() {
    exercise(&mut PathResampleMove::new(), 1);
}

#[test]
fn node_move_restores_on_reject() {
    exercise(&mut NodeResampleMove::new(), 2);
}

#[test]
fn tip_move_restores_on_reject() {
    exercise_on(&mut TipResampleMove::new(), model_from(ambiguous_ctmc(), 8), 8);
}

#[test]
fn tip_move_needs_an_ambiguous_tip() {
    let mut model = initialised_model(9);
    let err = TipResampleMove::new()
        .propose(&mut model, &mut RngHandle::from_seed(9))
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(err.info().code, "no-ambiguous-tip");
}

#[test]
fn tip_move_only_touches_the_tip_branch() {
    let mut model = model_from(ambiguous_ctmc(), 10);
    let mut mv = TipResampleMove::new();
    let mut rng = RngHandle::from_seed(11);
    let mut flipped = false;
    for _ in 0..60 {
        let before = snapshot(&model);
        if mv.propose(&mut model, &mut rng).is_err() {
            mv.reject(&mut model);
            continue;
        }
        mv.accept(&mut model);
        let after = snapshot(&model);
        for node in [0, 2, 3, 4] {
            assert_eq!(after[node], before[node]);
        }
        assert_eq!(after[1].parent_states(), before[1].parent_states());
        flipped |= after[1].child_states() != before[1].child_states();
    }
    assert!(flipped, "tip states never changed");
}

#[test]
fn clock_move_restores_on_reject() {
    exercise(&mut ClockScaleMove::new(0.8).unwrap(), 3);
}

#[test]
fn clock_move_hastings_is_the_log_factor() {
    let mut model = initialised_model(4);
    let mut mv = ClockScaleMove::new(1.0).unwrap();
    let mut rng = RngHandle::from_seed(5);
    let before = model.clock_rate();
    let ratio = mv.propose(&mut model, &mut rng).unwrap();
    assert!((model.clock_rate() - before * ratio.exp()).abs() < 1e-12);
    assert!(ratio.abs() <= 0.5);
}

#[test]
fn path_move_keeps_endpoints() {
    let mut model = initialised_model(6);
    let mut mv = PathResampleMove::new();
    let mut rng = RngHandle::from_seed(7);
    let ends: Vec<(Vec<usize>, Vec<usize>)> = model
        .ctmc()
        .histories()
        .iter()
        .map(|h| (h.parent_states(), h.child_states()))
        .collect();
    for _ in 0..25 {
        if mv.propose(&mut model, &mut rng).is_ok() {
            mv.accept(&mut model);
        }
    }
    let after: Vec<(Vec<usize>, Vec<usize>)> = model
        .ctmc()
        .histories()
        .iter()
        .map(|h| (h.parent_states(), h.child_states()))
        .collect();
    assert_eq!(ends, after);
}

#[test]
fn kernel_records_every_generation() {
    let config = RunConfig::from_yaml_str(
        "generations: 20\nburnin: 6\nswap_interval: 3\nladder:\n  chains: 2\n  delta: 0.4\n",
    )
    .unwrap();
    let report = kernel::run(&config, &observed_ctmc(), None).unwrap();
    assert_eq!(report.trace.len(), 21);
    assert_eq!(report.summary.generations, 20);
    assert!(report.trace.iter().all(|row| row.heat == 1.0));
    assert_eq!(
        report.trace[0]
            .values
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>(),
        ["ln_likelihood", "clock_rate", "num_events"]
    );
    assert!(report.mean_ln_posterior.is_some_and(f64::is_finite));
    assert!(report.trace_path.is_none());
    // three move types on each of the two chains
    assert_eq!(report.summary.operators.len(), 6);
}

#[test]
fn kernel_adds_the_tip_move_for_ambiguous_tips() {
    let config = RunConfig::from_yaml_str("generations: 10\nladder:\n  chains: 1\n").unwrap();
    let report = kernel::run(&config, &ambiguous_ctmc(), None).unwrap();
    assert_eq!(report.summary.operators.len(), 4);
    let tip = report
        .summary
        .operators
        .iter()
        .find(|row| row.name == "tip-resample")
        .unwrap();
    assert_eq!(tip.weight, 2);
    assert!(tip.tried > 0);
    assert!(report.mean_ln_posterior.is_some_and(f64::is_finite));
}
