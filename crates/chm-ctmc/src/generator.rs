use std::sync::Arc;

use chm_core::errors::{ChmError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::event::CharacterEvent;
use crate::modifier::{ModifyRate, NodeContext, RateModifier};
use crate::OFF_STATE;

/// Base instantaneous rates between states; the diagonal is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateMatrix {
    num_states: usize,
    rates: Vec<f64>,
}

impl RateMatrix {
    /// Builds a matrix from rows; off-diagonal entries must be finite and
    /// non-negative.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, ChmError> {
        let num_states = rows.len();
        if num_states < 2 {
            return Err(ChmError::Config(
                ErrorInfo::new("rate-matrix-size", "rate matrix needs at least two states")
                    .with_context("states", num_states.to_string()),
            ));
        }
        let mut rates = Vec::with_capacity(num_states * num_states);
        for (from, row) in rows.iter().enumerate() {
            if row.len() != num_states {
                return Err(ChmError::Config(
                    ErrorInfo::new("rate-matrix-shape", "rate matrix must be square")
                        .with_context("row", from.to_string()),
                ));
            }
            for (to, &rate) in row.iter().enumerate() {
                if from != to && (!rate.is_finite() || rate < 0.0) {
                    return Err(ChmError::Config(
                        ErrorInfo::new("rate-matrix-value", "rates must be finite and non-negative")
                            .with_context("from", from.to_string())
                            .with_context("to", to.to_string())
                            .with_context("rate", rate.to_string()),
                    ));
                }
                rates.push(if from == to { 0.0 } else { rate });
            }
        }
        Ok(Self { num_states, rates })
    }

    /// Two-state matrix with a gain rate (0 -> 1) and a loss rate (1 -> 0).
    pub fn binary(gain: f64, loss: f64) -> Result<Self, ChmError> {
        Self::new(vec![vec![0.0, gain], vec![loss, 0.0]])
    }

    /// Number of states.
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Base rate from `from` to `to`.
    pub fn rate(&self, from: usize, to: usize) -> f64 {
        if from == to {
            0.0
        } else {
            self.rates[from * self.num_states + to]
        }
    }
}

/// Composes the base matrix, the clock and the modifier set into realized
/// event rates.
#[derive(Debug, Clone)]
pub struct RateGenerator {
    matrix: RateMatrix,
    clock_rate: f64,
    modifiers: Vec<Arc<RateModifier>>,
    forbid_extinction: bool,
}

/// Candidate event with its realized rate, listed site-major, state-minor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Site that would change.
    pub site: usize,
    /// State it would enter.
    pub state: usize,
    /// Realized rate.
    pub rate: f64,
}

impl RateGenerator {
    /// Creates a generator without modifiers.
    pub fn new(matrix: RateMatrix, clock_rate: f64) -> Result<Self, ChmError> {
        check_clock(clock_rate)?;
        Ok(Self {
            matrix,
            clock_rate,
            modifiers: Vec::new(),
            forbid_extinction: false,
        })
    }

    /// Appends a modifier owned by this generator.
    pub fn with_modifier(mut self, modifier: impl Into<RateModifier>) -> Self {
        self.modifiers.push(Arc::new(modifier.into()));
        self
    }

    /// Appends a modifier shared with other generators.
    pub fn with_shared_modifier(mut self, modifier: Arc<RateModifier>) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Excludes events that would leave no occupied site.
    pub fn with_forbid_extinction(mut self, forbid: bool) -> Self {
        self.forbid_extinction = forbid;
        self
    }

    /// Number of states of the base matrix.
    pub fn num_states(&self) -> usize {
        self.matrix.num_states()
    }

    /// Base matrix.
    pub fn matrix(&self) -> &RateMatrix {
        &self.matrix
    }

    /// Global clock rate.
    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }

    /// Replaces the clock rate.
    pub fn set_clock_rate(&mut self, clock_rate: f64) -> Result<(), ChmError> {
        check_clock(clock_rate)?;
        self.clock_rate = clock_rate;
        Ok(())
    }

    /// Whether extinction events are excluded.
    pub fn forbids_extinction(&self) -> bool {
        self.forbid_extinction
    }

    /// Modifiers in application order.
    pub fn modifiers(&self) -> &[Arc<RateModifier>] {
        &self.modifiers
    }

    /// Mutable access to one modifier, cloning it first if it is shared.
    pub fn modifier_mut(&mut self, index: usize) -> Option<&mut RateModifier> {
        self.modifiers.get_mut(index).map(Arc::make_mut)
    }

    /// Refreshes every modifier cache.
    pub fn update_modifiers(&mut self) {
        for modifier in &mut self.modifiers {
            Arc::make_mut(modifier).update();
        }
    }

    /// Realized rate of `event` from `current`, ignoring the extinction rule.
    pub fn rate(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        age: f64,
        node: Option<&NodeContext>,
    ) -> f64 {
        let from = current[event.site];
        let base = self.matrix.rate(from, event.state) * self.clock_rate;
        if base == 0.0 {
            return 0.0;
        }
        self.modifiers.iter().fold(base, |rate, modifier| {
            rate * modifier.compute_multiplier(current, event, age, node)
        })
    }

    /// Realized rate including the extinction rule; `occupied` is the number
    /// of occupied sites in `current`.
    pub fn allowed_rate(
        &self,
        current: &[usize],
        occupied: usize,
        event: &CharacterEvent,
        age: f64,
        node: Option<&NodeContext>,
    ) -> f64 {
        if self.would_extinguish(current, occupied, event) {
            0.0
        } else {
            self.rate(current, event, age, node)
        }
    }

    /// Collects every allowed candidate at `sites` into `out` and returns the
    /// summed rate.
    pub fn candidates(
        &self,
        current: &[usize],
        occupied: usize,
        sites: &[usize],
        age: f64,
        node: Option<&NodeContext>,
        out: &mut Vec<Candidate>,
    ) -> f64 {
        out.clear();
        let mut total = 0.0;
        for &site in sites {
            for state in 0..self.num_states() {
                if state == current[site] {
                    continue;
                }
                let event = CharacterEvent::new(site, state, 0.0);
                let rate = self.allowed_rate(current, occupied, &event, age, node);
                if rate > 0.0 {
                    total += rate;
                    out.push(Candidate { site, state, rate });
                }
            }
        }
        total
    }

    /// Total allowed rate leaving `current`.
    pub fn sum_of_rates(
        &self,
        current: &[usize],
        occupied: usize,
        age: f64,
        node: Option<&NodeContext>,
    ) -> f64 {
        let mut total = 0.0;
        for site in 0..current.len() {
            for state in 0..self.num_states() {
                if state == current[site] {
                    continue;
                }
                let event = CharacterEvent::new(site, state, 0.0);
                total += self.allowed_rate(current, occupied, &event, age, node);
            }
        }
        total
    }

    /// Rate of a single site evolving independently of the others.
    pub fn site_rate(&self, from: usize, to: usize, site: usize, age: f64) -> f64 {
        let base = self.matrix.rate(from, to) * self.clock_rate;
        self.modifiers.iter().fold(base, |rate, modifier| {
            rate * modifier.site_multiplier(from, to, site, age)
        })
    }

    fn would_extinguish(&self, current: &[usize], occupied: usize, event: &CharacterEvent) -> bool {
        self.forbid_extinction
            && occupied <= 1
            && current[event.site] != OFF_STATE
            && event.state == OFF_STATE
    }
}

fn check_clock(clock_rate: f64) -> Result<(), ChmError> {
    if !clock_rate.is_finite() || clock_rate < 0.0 {
        return Err(ChmError::Config(
            ErrorInfo::new("clock-rate", "clock rate must be finite and non-negative")
                .with_context("clock_rate", clock_rate.to_string()),
        ));
    }
    Ok(())
}
