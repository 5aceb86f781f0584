use chm_core::ChmError;
use chm_ctmc::HistoryCtmc;

use crate::chain::Model;
use crate::config::ClockPrior;

/// Posterior over latent character histories and the clock rate.
///
/// The log posterior is the joint history probability computed by the
/// engine plus the clock prior.
#[derive(Debug, Clone)]
pub struct HistoryModel {
    ctmc: HistoryCtmc,
    clock_prior: ClockPrior,
}

impl HistoryModel {
    /// Wraps an engine whose histories are already initialised.
    pub fn new(ctmc: HistoryCtmc, clock_prior: ClockPrior) -> Result<Self, ChmError> {
        clock_prior.validate()?;
        Ok(Self { ctmc, clock_prior })
    }

    /// Underlying engine.
    pub fn ctmc(&self) -> &HistoryCtmc {
        &self.ctmc
    }

    /// Mutable access for moves.
    pub fn ctmc_mut(&mut self) -> &mut HistoryCtmc {
        &mut self.ctmc
    }

    /// Prior on the clock rate.
    pub fn clock_prior(&self) -> ClockPrior {
        self.clock_prior
    }

    /// Current clock rate.
    pub fn clock_rate(&self) -> f64 {
        self.ctmc.generator().clock_rate()
    }

    /// Replaces the clock rate.
    pub fn set_clock_rate(&mut self, clock_rate: f64) -> Result<(), ChmError> {
        self.ctmc.generator_mut().set_clock_rate(clock_rate)
    }

    /// Log probability of the histories alone.
    pub fn ln_likelihood(&self) -> f64 {
        self.ctmc.compute_log_probability()
    }

    /// Total number of interior events over every branch.
    pub fn num_events(&self) -> usize {
        self.ctmc
            .histories()
            .iter()
            .map(|history| history.num_events())
            .sum()
    }
}

impl Model for HistoryModel {
    fn ln_posterior(&self) -> f64 {
        self.ln_likelihood() + self.clock_prior.ln_density(self.clock_rate())
    }

    fn trace_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("ln_likelihood", self.ln_likelihood()),
            ("clock_rate", self.clock_rate()),
            ("num_events", self.num_events() as f64),
        ]
    }
}
