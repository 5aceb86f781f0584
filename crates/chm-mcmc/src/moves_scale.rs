use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::RngHandle;

use crate::chain::Move;
use crate::model::HistoryModel;
use crate::tuning::{self, SCALE_TARGET};

/// Multiplies the clock rate by `exp(lambda * (u - 0.5))`.
#[derive(Debug, Clone)]
pub struct ClockScaleMove {
    lambda: f64,
    saved: Option<f64>,
}

impl ClockScaleMove {
    /// Creates the move with initial tuning parameter `lambda`.
    pub fn new(lambda: f64) -> Result<Self, ChmError> {
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(ChmError::Config(
                ErrorInfo::new("scale-lambda", "lambda must be finite and positive")
                    .with_context("lambda", lambda.to_string()),
            ));
        }
        Ok(Self {
            lambda,
            saved: None,
        })
    }

    /// Current tuning parameter.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Move<HistoryModel> for ClockScaleMove {
    fn name(&self) -> &str {
        "clock-scale"
    }

    fn propose(&mut self, model: &mut HistoryModel, rng: &mut RngHandle) -> Result<f64, ChmError> {
        let current = model.clock_rate();
        let ln_factor = self.lambda * (rng.uniform() - 0.5);
        let proposed = current * ln_factor.exp();
        if !proposed.is_finite() || proposed <= 0.0 {
            return Err(ChmError::Sampling(
                ErrorInfo::new("scale-out-of-range", "scaled clock rate is not representable")
                    .with_context("current", current.to_string()),
            ));
        }
        self.saved = Some(current);
        model.set_clock_rate(proposed)?;
        Ok(ln_factor)
    }

    fn accept(&mut self, _model: &mut HistoryModel) {
        self.saved = None;
    }

    fn reject(&mut self, model: &mut HistoryModel) {
        if let Some(previous) = self.saved.take() {
            // restoring a rate that already passed validation cannot fail
            let _ = model.set_clock_rate(previous);
        }
    }

    fn tune(&mut self, rate: f64) {
        self.lambda = tuning::tune_step(self.lambda, rate, SCALE_TARGET);
    }

    fn tuning_parameter(&self) -> Option<f64> {
        Some(self.lambda)
    }
}
