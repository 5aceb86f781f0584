//! One Markov chain at a fixed heat.
//!
//! The scheduler sees a chain only through "advance one cycle", its current
//! log posterior, its heat and its active flag. Models, moves and monitors
//! are supplied by the caller through the traits below.

use chm_core::{ChmError, RngHandle};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Log acceptance ratios below this value are rejected without a draw.
pub const LN_RATIO_FLOOR: f64 = -300.0;

/// State whose posterior the chain samples.
pub trait Model: Send {
    /// Unheated log posterior of the current state.
    fn ln_posterior(&self) -> f64;

    /// Named scalar summaries recorded by trace monitors.
    fn trace_values(&self) -> Vec<(&'static str, f64)> {
        Vec::new()
    }
}

/// Proposal acting on a model.
///
/// `propose` mutates the model in place and returns the log Hastings ratio.
/// The chain then calls exactly one of `accept` or `reject`. A recoverable
/// error from `propose` is treated as a rejection, so `reject` must restore
/// the model whatever point `propose` reached.
pub trait Move<M>: Send {
    /// Name reported in operator summaries.
    fn name(&self) -> &str;

    /// Applies a proposal to `model`.
    fn propose(&mut self, model: &mut M, rng: &mut RngHandle) -> Result<f64, ChmError>;

    /// Keeps the proposed state.
    fn accept(&mut self, model: &mut M);

    /// Restores the state saved by the last proposal.
    fn reject(&mut self, model: &mut M);

    /// Adapts the proposal step to the recent acceptance rate.
    fn tune(&mut self, _rate: f64) {}

    /// Current tuning parameter, if the move has one.
    fn tuning_parameter(&self) -> Option<f64> {
        None
    }
}

/// Callback invoked for the active chain after each completed generation.
pub trait Monitor<M>: Send {
    /// Records `model` at `generation`.
    fn on_generation(&mut self, generation: usize, model: &M, heat: f64) -> Result<(), ChmError>;
}

/// Proposal counters of one move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    /// Proposals attempted since the chain was created.
    pub tried: usize,
    /// Proposals accepted since the chain was created.
    pub accepted: usize,
    /// Proposals attempted since the last tuning pass.
    pub recent_tried: usize,
    /// Proposals accepted since the last tuning pass.
    pub recent_accepted: usize,
}

impl MoveStats {
    fn record(&mut self, accepted: bool) {
        self.tried += 1;
        self.recent_tried += 1;
        if accepted {
            self.accepted += 1;
            self.recent_accepted += 1;
        }
    }

    /// Overall acceptance ratio, zero before the first proposal.
    pub fn acceptance(&self) -> f64 {
        if self.tried == 0 {
            0.0
        } else {
            self.accepted as f64 / self.tried as f64
        }
    }

    /// Acceptance ratio since the last tuning pass.
    pub fn recent_rate(&self) -> Option<f64> {
        (self.recent_tried > 0).then(|| self.recent_accepted as f64 / self.recent_tried as f64)
    }
}

/// One row of the operator summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRow {
    /// Chain index within the scheduler.
    pub chain: usize,
    /// Move name.
    pub name: String,
    /// Proposals per cycle.
    pub weight: usize,
    /// Proposals attempted.
    pub tried: usize,
    /// Proposals accepted.
    pub accepted: usize,
    /// Acceptance ratio.
    pub acceptance: f64,
    /// Tuning parameter after the last tuning pass.
    pub tuning_parameter: Option<f64>,
}

struct MoveSlot<M> {
    inner: Box<dyn Move<M>>,
    weight: usize,
    stats: MoveStats,
}

/// One {model, moves, monitors} instance evaluated at a fixed heat.
pub struct Chain<M> {
    model: M,
    moves: Vec<MoveSlot<M>>,
    monitors: Vec<Box<dyn Monitor<M>>>,
    heat: f64,
    active: bool,
    rng: RngHandle,
    ln_posterior: f64,
}

impl<M: Model> Chain<M> {
    /// Creates a cold, active chain around `model`.
    pub fn new(model: M) -> Self {
        let ln_posterior = model.ln_posterior();
        Self {
            model,
            moves: Vec::new(),
            monitors: Vec::new(),
            heat: 1.0,
            active: true,
            rng: RngHandle::from_seed(0),
            ln_posterior,
        }
    }

    /// Adds a move attempted `weight` times per cycle.
    pub fn with_move(mut self, mv: impl Move<M> + 'static, weight: usize) -> Self {
        self.add_move(Box::new(mv), weight);
        self
    }

    /// Adds a boxed move attempted `weight` times per cycle.
    pub fn add_move(&mut self, mv: Box<dyn Move<M>>, weight: usize) {
        self.moves.push(MoveSlot {
            inner: mv,
            weight,
            stats: MoveStats::default(),
        });
    }

    /// Adds a monitor.
    pub fn with_monitor(mut self, monitor: impl Monitor<M> + 'static) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }

    /// Replaces the random stream.
    pub fn with_rng(mut self, rng: RngHandle) -> Self {
        self.rng = rng;
        self
    }

    /// Current model state.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Heat applied to the log posterior.
    pub fn heat(&self) -> f64 {
        self.heat
    }

    /// Whether this chain is the one being recorded.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Cached unheated log posterior of the current state.
    pub fn ln_posterior(&self) -> f64 {
        self.ln_posterior
    }

    pub(crate) fn set_heat(&mut self, heat: f64) {
        self.heat = heat;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn reseed(&mut self, rng: RngHandle) {
        self.rng = rng;
    }

    /// Counters of every move in registration order.
    pub fn move_stats(&self) -> Vec<MoveStats> {
        self.moves.iter().map(|slot| slot.stats).collect()
    }

    /// Advances the chain by one cycle: every move is attempted as many
    /// times as its weight.
    pub fn next_cycle(&mut self) -> Result<(), ChmError> {
        for index in 0..self.moves.len() {
            for _ in 0..self.moves[index].weight {
                self.perform(index)?;
            }
        }
        Ok(())
    }

    fn perform(&mut self, index: usize) -> Result<(), ChmError> {
        let slot = &mut self.moves[index];
        let ln_hastings = match slot.inner.propose(&mut self.model, &mut self.rng) {
            Ok(ratio) => ratio,
            Err(err) if err.is_recoverable() => {
                trace!(operator = slot.inner.name(), code = %err.info().code, "proposal failed");
                slot.inner.reject(&mut self.model);
                slot.stats.record(false);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let proposed = self.model.ln_posterior();
        let ln_ratio = self.heat * (proposed - self.ln_posterior) + ln_hastings;
        let accepted = metropolis_accept(ln_ratio, &mut self.rng);
        if accepted {
            slot.inner.accept(&mut self.model);
            self.ln_posterior = proposed;
        } else {
            slot.inner.reject(&mut self.model);
        }
        slot.stats.record(accepted);
        Ok(())
    }

    /// Invokes every monitor for `generation`.
    pub fn notify_monitors(&mut self, generation: usize) -> Result<(), ChmError> {
        for monitor in &mut self.monitors {
            monitor.on_generation(generation, &self.model, self.heat)?;
        }
        Ok(())
    }

    /// Tunes every move from its acceptance rate since the last pass.
    pub fn tune_moves(&mut self) {
        for slot in &mut self.moves {
            if let Some(rate) = slot.stats.recent_rate() {
                slot.inner.tune(rate);
            }
            slot.stats.recent_tried = 0;
            slot.stats.recent_accepted = 0;
        }
    }

    /// Operator summary rows for this chain.
    pub fn operator_rows(&self, chain: usize) -> Vec<OperatorRow> {
        self.moves
            .iter()
            .map(|slot| OperatorRow {
                chain,
                name: slot.inner.name().to_string(),
                weight: slot.weight,
                tried: slot.stats.tried,
                accepted: slot.stats.accepted,
                acceptance: slot.stats.acceptance(),
                tuning_parameter: slot.inner.tuning_parameter(),
            })
            .collect()
    }
}

/// Metropolis decision on a log acceptance ratio.
///
/// Accepts when the ratio is non-negative, rejects below
/// [`LN_RATIO_FLOOR`] or on NaN, and otherwise draws `u < exp(ln_ratio)`.
pub fn metropolis_accept(ln_ratio: f64, rng: &mut RngHandle) -> bool {
    if ln_ratio.is_nan() {
        return false;
    }
    if ln_ratio >= 0.0 {
        return true;
    }
    if ln_ratio < LN_RATIO_FLOOR {
        return false;
    }
    rng.uniform() < ln_ratio.exp()
}
