#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chm_core::{ChmError, RngHandle, Tree};
use chm_ctmc::{HistoryConfig, HistoryCtmc, RateGenerator, RateMatrix};
use chm_mcmc::{
    Chain, CoupledScheduler, Model, Monitor, Move, SchedulerOptions, SwapRule,
};

/// Standard normal target on a single coordinate.
#[derive(Debug, Clone)]
pub struct Gaussian {
    pub x: f64,
}

impl Model for Gaussian {
    fn ln_posterior(&self) -> f64 {
        -0.5 * self.x * self.x
    }

    fn trace_values(&self) -> Vec<(&'static str, f64)> {
        vec![("x", self.x)]
    }
}

/// Symmetric uniform random walk.
pub struct RandomWalk {
    pub step: f64,
    saved: Option<f64>,
}

impl RandomWalk {
    pub fn new(step: f64) -> Self {
        Self { step, saved: None }
    }
}

impl Move<Gaussian> for RandomWalk {
    fn name(&self) -> &str {
        "random-walk"
    }

    fn propose(&mut self, model: &mut Gaussian, rng: &mut RngHandle) -> Result<f64, ChmError> {
        self.saved = Some(model.x);
        model.x += self.step * (rng.uniform() - 0.5);
        Ok(0.0)
    }

    fn accept(&mut self, _model: &mut Gaussian) {
        self.saved = None;
    }

    fn reject(&mut self, model: &mut Gaussian) {
        if let Some(x) = self.saved.take() {
            model.x = x;
        }
    }

    fn tune(&mut self, rate: f64) {
        self.step = chm_mcmc::tuning::tune_step(self.step, rate, chm_mcmc::tuning::SCALE_TARGET);
    }

    fn tuning_parameter(&self) -> Option<f64> {
        Some(self.step)
    }
}

/// Records `(generation, chain)` for every call.
pub struct CountingMonitor {
    pub calls: Arc<Mutex<Vec<(usize, usize)>>>,
    pub chain: usize,
}

impl<M: Model> Monitor<M> for CountingMonitor {
    fn on_generation(&mut self, generation: usize, _model: &M, _heat: f64) -> Result<(), ChmError> {
        self.calls.lock().unwrap().push((generation, self.chain));
        Ok(())
    }
}

pub fn options(delta: f64, swap_interval: usize, seed: u64) -> SchedulerOptions {
    SchedulerOptions {
        delta,
        swap_interval,
        swap_rule: SwapRule::Canonical,
        master_seed: seed,
        threads: 0,
    }
}

pub fn gaussian_scheduler(
    chains: usize,
    swap_interval: usize,
    seed: u64,
    calls: &Arc<Mutex<Vec<(usize, usize)>>>,
) -> CoupledScheduler<Gaussian> {
    let chains = (0..chains)
        .map(|index| {
            Chain::new(Gaussian { x: 0.0 })
                .with_move(RandomWalk::new(1.0), 1)
                .with_monitor(CountingMonitor {
                    calls: calls.clone(),
                    chain: index,
                })
        })
        .collect();
    CoupledScheduler::new(chains, options(0.5, swap_interval, seed)).unwrap()
}

/// `((0:1,1:1)3:1,2:2)4;` with three sites observed at the tips.
pub fn observed_ctmc() -> HistoryCtmc {
    let tree = Tree::from_parent_indices(&[3, 3, 4, 4, -1], &[1.0, 1.0, 2.0, 1.0, 0.0]).unwrap();
    let generator = RateGenerator::new(RateMatrix::binary(0.8, 0.6).unwrap(), 1.0).unwrap();
    let mut ctmc = HistoryCtmc::new(Arc::new(tree), generator, 3, HistoryConfig::default()).unwrap();
    ctmc.set_tip_states(0, &[1, 0, 1]).unwrap();
    ctmc.set_tip_states(1, &[1, 1, 0]).unwrap();
    ctmc.set_tip_states(2, &[0, 0, 1]).unwrap();
    ctmc
}

/// Same tree as [`observed_ctmc`], with tip 1 seen only through per-site
/// probabilities of presence.
pub fn ambiguous_ctmc() -> HistoryCtmc {
    let mut ctmc = observed_ctmc();
    ctmc.set_tip_probabilities(1, vec![0.9, 0.5, 0.2]).unwrap();
    ctmc
}
