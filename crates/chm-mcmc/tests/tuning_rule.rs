mod common;

use std::sync::{Arc, Mutex};

use chm_core::{ChmError, RngHandle};
use chm_mcmc::tuning::{tune_step, MULTI_TARGET, SCALE_TARGET};
use chm_mcmc::{Chain, ClockScaleMove, CoupledScheduler, Move};
use common::{options, Gaussian};

struct RateRecorder {
    rates: Arc<Mutex<Vec<f64>>>,
}

impl Move<Gaussian> for RateRecorder {
    fn name(&self) -> &str {
        "rate-recorder"
    }

    fn propose(&mut self, _model: &mut Gaussian, _rng: &mut RngHandle) -> Result<f64, ChmError> {
        Ok(0.0)
    }

    fn accept(&mut self, _model: &mut Gaussian) {}

    fn reject(&mut self, _model: &mut Gaussian) {}

    fn tune(&mut self, rate: f64) {
        self.rates.lock().unwrap().push(rate);
    }
}

#[test]
fn scale_target_above_rate_grows_lambda() {
    let lambda = tune_step(1.0, 0.6, SCALE_TARGET);
    assert!((lambda - 1.2857).abs() < 1e-4);
    assert!((lambda - (1.0 + 0.16 / 0.56)).abs() < 1e-12);
}

#[test]
fn below_target_shrinks() {
    let step = tune_step(0.5, 0.117, MULTI_TARGET);
    assert!((step - 0.5 / 1.5).abs() < 1e-12);
}

#[test]
fn clock_move_tunes_its_lambda() {
    let mut mv = ClockScaleMove::new(1.0).unwrap();
    <ClockScaleMove as Move<chm_mcmc::HistoryModel>>::tune(&mut mv, 0.6);
    assert!((mv.lambda() - 1.285_714_285_714_285_8).abs() < 1e-12);
}

#[test]
fn burnin_tunes_every_interval() {
    let rates = Arc::new(Mutex::new(Vec::new()));
    let chains = (0..2)
        .map(|_| {
            Chain::new(Gaussian { x: 0.0 }).with_move(
                RateRecorder {
                    rates: rates.clone(),
                },
                2,
            )
        })
        .collect();
    let mut scheduler = CoupledScheduler::new(chains, options(0.3, 3, 21)).unwrap();
    scheduler.burnin(10, 5).unwrap();
    let rates = rates.lock().unwrap();
    // two chains tuned after burn-in generations 5 and 10
    assert_eq!(rates.len(), 4);
    assert!(rates.iter().all(|&rate| rate == 1.0));
    let stats = scheduler.chains()[0].move_stats()[0];
    assert_eq!(stats.tried, 20);
    assert_eq!(stats.recent_tried, 0);
}

#[test]
fn zero_interval_disables_tuning() {
    let rates = Arc::new(Mutex::new(Vec::new()));
    let chains = vec![Chain::new(Gaussian { x: 0.0 }).with_move(
        RateRecorder {
            rates: rates.clone(),
        },
        1,
    )];
    let mut scheduler = CoupledScheduler::new(chains, options(0.3, 3, 22)).unwrap();
    scheduler.burnin(10, 0).unwrap();
    assert!(rates.lock().unwrap().is_empty());
}

#[test]
fn operator_summary_lists_tuned_parameters() {
    let chains = (0..2)
        .map(|_| Chain::new(Gaussian { x: 0.0 }).with_move(common::RandomWalk::new(1.0), 1))
        .collect();
    let mut scheduler = CoupledScheduler::new(chains, options(0.3, 2, 23)).unwrap();
    scheduler.burnin(20, 10).unwrap();
    let rows = scheduler.operator_rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.tried == 20 && row.name == "random-walk"));
    assert!(rows
        .iter()
        .all(|row| row.tuning_parameter.is_some_and(|step| step != 1.0)));

    let mut out = Vec::new();
    scheduler.print_operator_summary(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert!(text.lines().last().unwrap().starts_with("swaps: 10 attempted"));

    let mut from_summary = Vec::new();
    scheduler
        .summary()
        .print_operator_summary(&mut from_summary)
        .unwrap();
    assert_eq!(String::from_utf8(from_summary).unwrap(), text);
}
