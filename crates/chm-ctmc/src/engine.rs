use std::sync::Arc;

use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::{RngHandle, Tree};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::event::CharacterEvent;
use crate::generator::{Candidate, RateGenerator};
use crate::history::{count_occupied, BranchHistory};
use crate::modifier::NodeContext;
use crate::transition::TwoStateTransition;
use crate::OFF_STATE;

/// Options controlling how histories are simulated and scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Forbid histories in which every site is off at some instant.
    #[serde(default)]
    pub forbid_extinction: bool,
    /// Root state frequencies; uniform when absent.
    #[serde(default)]
    pub root_frequencies: Option<Vec<f64>>,
    /// Scalar used for the root branch and for zero-length branches.
    #[serde(default = "default_fallback_scalar")]
    pub fallback_branch_scalar: f64,
    /// Length used when sampling root states in closed form.
    #[serde(default = "default_root_sampling_length")]
    pub root_sampling_length: f64,
    /// Simulate and score events on the branch above the root.
    #[serde(default)]
    pub use_root_tail: bool,
    /// Multiplier applied to every branch length.
    #[serde(default = "default_length_rescale")]
    pub branch_length_rescale: f64,
    /// Attempts before endpoint-conditioned sampling gives up.
    #[serde(default = "default_max_attempts")]
    pub max_resample_attempts: usize,
}

fn default_fallback_scalar() -> f64 {
    1.0
}

fn default_root_sampling_length() -> f64 {
    1000.0
}

fn default_length_rescale() -> f64 {
    1.0
}

fn default_max_attempts() -> usize {
    1000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            forbid_extinction: false,
            root_frequencies: None,
            fallback_branch_scalar: default_fallback_scalar(),
            root_sampling_length: default_root_sampling_length(),
            use_root_tail: false,
            branch_length_rescale: default_length_rescale(),
            max_resample_attempts: default_max_attempts(),
        }
    }
}

/// Character-history CTMC over every branch of a tree.
///
/// The history of node `i` lives on the branch above `i`: its parent end
/// holds the states at the parent node and its child end the states at `i`.
#[derive(Debug, Clone)]
pub struct HistoryCtmc {
    tree: Arc<Tree>,
    generator: RateGenerator,
    config: HistoryConfig,
    root_frequencies: Vec<f64>,
    histories: Vec<BranchHistory>,
    branch_rates: Vec<f64>,
    tip_probabilities: Vec<Option<Vec<f64>>>,
    num_sites: usize,
}

impl HistoryCtmc {
    /// Creates an engine with every site off on every branch.
    pub fn new(
        tree: Arc<Tree>,
        generator: RateGenerator,
        num_sites: usize,
        config: HistoryConfig,
    ) -> Result<Self, ChmError> {
        if num_sites == 0 {
            return Err(ChmError::Config(ErrorInfo::new(
                "no-sites",
                "at least one site is required",
            )));
        }
        let num_states = generator.num_states();
        let root_frequencies = match &config.root_frequencies {
            Some(freqs) => normalize_frequencies(freqs, num_states)?,
            None => vec![1.0 / num_states as f64; num_states],
        };
        for (name, value) in [
            ("fallback_branch_scalar", config.fallback_branch_scalar),
            ("root_sampling_length", config.root_sampling_length),
            ("branch_length_rescale", config.branch_length_rescale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ChmError::Config(
                    ErrorInfo::new("history-scalar", "history scalars must be finite and positive")
                        .with_context("field", name)
                        .with_context("value", value.to_string()),
                ));
            }
        }
        if config.max_resample_attempts == 0 {
            return Err(ChmError::Config(ErrorInfo::new(
                "max-resample-attempts",
                "max_resample_attempts must be at least 1",
            )));
        }
        let generator = generator.with_forbid_extinction(config.forbid_extinction);
        let num_nodes = tree.num_nodes();
        let empty = vec![OFF_STATE; num_sites];
        Ok(Self {
            histories: vec![BranchHistory::new(&empty); num_nodes],
            branch_rates: vec![1.0; num_nodes],
            tip_probabilities: vec![None; num_nodes],
            tree,
            generator,
            config,
            root_frequencies,
            num_sites,
        })
    }

    /// Number of sites.
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// Underlying tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Engine options.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Rate generator.
    pub fn generator(&self) -> &RateGenerator {
        &self.generator
    }

    /// Mutable rate generator, e.g. to change the clock or a modifier.
    pub fn generator_mut(&mut self) -> &mut RateGenerator {
        &mut self.generator
    }

    /// History on the branch above `node`.
    pub fn history(&self, node: usize) -> &BranchHistory {
        &self.histories[node]
    }

    /// Every branch history, indexed by node.
    pub fn histories(&self) -> &[BranchHistory] {
        &self.histories
    }

    /// Replaces the history above `node`, e.g. when a proposal is rejected.
    pub fn restore_history(&mut self, node: usize, history: BranchHistory) {
        self.histories[node] = history;
    }

    /// Replaces every branch history.
    pub fn restore_histories(&mut self, histories: Vec<BranchHistory>) {
        self.histories = histories;
    }

    /// Sets the relaxed-clock multiplier of the branch above `node`.
    pub fn set_branch_rate(&mut self, node: usize, rate: f64) -> Result<(), ChmError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(ChmError::Config(
                ErrorInfo::new("branch-rate", "branch rates must be finite and non-negative")
                    .with_context("node", node.to_string()),
            ));
        }
        self.branch_rates[node] = rate;
        Ok(())
    }

    /// Fixes the observed states at a tip.
    pub fn set_tip_states(&mut self, node: usize, states: &[usize]) -> Result<(), ChmError> {
        self.check_tip(node, states.len())?;
        if let Some(bad) = states.iter().find(|&&s| s >= self.generator.num_states()) {
            return Err(ChmError::Config(
                ErrorInfo::new("tip-state", "tip state exceeds the number of states")
                    .with_context("node", node.to_string())
                    .with_context("state", bad.to_string()),
            ));
        }
        for (site, &state) in states.iter().enumerate() {
            self.histories[node].set_child_state(site, state);
        }
        Ok(())
    }

    /// Marks a tip as ambiguous with per-site probabilities of state 1.
    pub fn set_tip_probabilities(
        &mut self,
        node: usize,
        probabilities: Vec<f64>,
    ) -> Result<(), ChmError> {
        self.check_tip(node, probabilities.len())?;
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(ChmError::Config(
                ErrorInfo::new("tip-probability", "tip probabilities must lie in [0, 1]")
                    .with_context("node", node.to_string()),
            ));
        }
        self.tip_probabilities[node] = Some(probabilities);
        Ok(())
    }

    /// Tips observed through per-site probabilities instead of exact states.
    pub fn ambiguous_tips(&self) -> Vec<usize> {
        (0..self.tree.num_nodes())
            .filter(|&node| self.tip_probabilities[node].is_some())
            .collect()
    }

    /// Log probability of the ambiguous tip observations given the current
    /// tip states: `ln p` for every site on, `ln(1 - p)` for every site off.
    pub fn tip_observation_log_probability(&self) -> f64 {
        let mut ln_prob = 0.0;
        for (node, probs) in self.tip_probabilities.iter().enumerate() {
            let Some(probs) = probs else {
                continue;
            };
            let history = &self.histories[node];
            for (site, &p) in probs.iter().enumerate() {
                ln_prob += if history.child_state(site) == OFF_STATE {
                    (1.0 - p).ln()
                } else {
                    p.ln()
                };
            }
        }
        ln_prob
    }

    /// Time scalar of the branch above `node`.
    pub fn branch_scalar(&self, node: usize) -> f64 {
        if node == self.tree.root() {
            return self.config.fallback_branch_scalar;
        }
        let length = self.tree.branch_length(node) * self.config.branch_length_rescale;
        if length <= 0.0 {
            self.config.fallback_branch_scalar
        } else {
            length * self.branch_rates[node]
        }
    }

    /// Age at relative time `t` on the branch above `node`.
    pub fn age_at(&self, node: usize, t: f64) -> f64 {
        let span = if node == self.tree.root() {
            self.config.fallback_branch_scalar
        } else {
            self.tree.branch_length(node)
        };
        self.tree.age(node) + (1.0 - t) * span
    }

    fn node_context(&self, node: usize) -> NodeContext {
        NodeContext {
            node,
            age: self.tree.age(node),
            branch_length: self.tree.branch_length(node),
        }
    }

    /// Whether the branch above `node` carries a scored path.
    pub fn scores_branch(&self, node: usize) -> bool {
        node != self.tree.root() || self.config.use_root_tail
    }

    /// Forward-simulates the branch above `node` from its parent states,
    /// replacing its events and child states.
    pub fn simulate(&mut self, node: usize, rng: &mut RngHandle) -> Result<(), ChmError> {
        self.check_node(node)?;
        let start = self.histories[node].parent_states();
        let sites: Vec<usize> = (0..self.num_sites).collect();
        let (events, end) = if self.scores_branch(node) {
            self.forward_path(node, &start, &sites, &[], rng)
        } else {
            (Vec::new(), start.clone())
        };
        let mut history = BranchHistory::new(&start);
        for (site, &state) in end.iter().enumerate() {
            history.set_child_state(site, state);
        }
        for event in events {
            history.push_event(event)?;
        }
        trace!(node, events = history.num_events(), "simulated branch");
        self.histories[node] = history;
        Ok(())
    }

    /// Draws root states from the root frequencies and simulates every
    /// branch in pre-order. Tip states are overwritten.
    pub fn simulate_tree(&mut self, rng: &mut RngHandle) -> Result<(), ChmError> {
        let root = self.tree.root();
        let mut top = vec![OFF_STATE; self.num_sites];
        for attempt in 0.. {
            for state in top.iter_mut() {
                *state = sample_index(&self.root_frequencies, rng);
            }
            if !self.config.forbid_extinction || count_occupied(&top) > 0 {
                break;
            }
            if attempt + 1 >= self.config.max_resample_attempts {
                return Err(exhausted("root-state-exhausted", root, attempt + 1));
            }
        }
        self.histories[root] = BranchHistory::new(&top);
        for node in self.tree.pre_order() {
            if let Some(parent) = self.tree.parent(node) {
                let start = self.histories[parent].child_states();
                self.histories[node] = BranchHistory::new(&start);
            }
            self.simulate(node, rng)?;
        }
        Ok(())
    }

    /// Resamples the events of `sites` on the branch above `node`, keeping
    /// both endpoints fixed.
    ///
    /// Events of the remaining sites are replayed at their times so the
    /// rate context stays correct. Gives up with a recoverable
    /// [`ChmError::Sampling`] after `max_resample_attempts`, leaving the
    /// history unchanged.
    pub fn resample_path(
        &mut self,
        node: usize,
        sites: &[usize],
        rng: &mut RngHandle,
    ) -> Result<(), ChmError> {
        self.check_node(node)?;
        self.check_sites(sites)?;
        if !self.scores_branch(node) {
            return Ok(());
        }
        let history = &self.histories[node];
        let start = history.parent_states();
        let target = history.child_states();
        let background: Vec<CharacterEvent> = history
            .events()
            .filter(|event| !sites.contains(&event.site))
            .copied()
            .collect();

        for _ in 0..self.config.max_resample_attempts {
            let (events, end) = self.forward_path(node, &start, sites, &background, rng);
            if sites.iter().any(|&site| end[site] != target[site]) {
                continue;
            }
            let mut candidate = self.histories[node].clone();
            candidate.replace_sites(sites, &events)?;
            if self.config.forbid_extinction && candidate.min_occupied() == 0 {
                continue;
            }
            self.histories[node] = candidate;
            return Ok(());
        }
        debug!(
            node,
            sites = sites.len(),
            attempts = self.config.max_resample_attempts,
            "path resampling exhausted"
        );
        Err(exhausted(
            "resample-exhausted",
            node,
            self.config.max_resample_attempts,
        ))
    }

    /// Resamples the root states of `sites` in closed form.
    ///
    /// With a root tail the parent end of the root branch is drawn given the
    /// root node state; otherwise the root node state itself is drawn given
    /// the root frequencies and its children.
    pub fn sample_root_state(
        &mut self,
        sites: &[usize],
        rng: &mut RngHandle,
    ) -> Result<(), ChmError> {
        self.check_binary()?;
        self.check_sites(sites)?;
        let root = self.tree.root();
        if !self.config.use_root_tail {
            return self.sample_child_state(root, sites, rng);
        }
        let mut proposed = self.histories[root].parent_states();
        for _ in 0..self.config.max_resample_attempts {
            for &site in sites {
                let tail = self.site_closed_form(root, site, self.config.root_sampling_length);
                let child = self.histories[root].child_state(site);
                let weights = [
                    self.root_frequencies[0] * tail.probability(0, child),
                    self.root_frequencies[1] * tail.probability(1, child),
                ];
                proposed[site] = sample_index(&weights, rng);
            }
            if self.config.forbid_extinction && count_occupied(&proposed) == 0 {
                continue;
            }
            for &site in sites {
                self.histories[root].set_parent_state(site, proposed[site]);
            }
            return Ok(());
        }
        Err(exhausted(
            "root-state-exhausted",
            root,
            self.config.max_resample_attempts,
        ))
    }

    /// Resamples the states of `sites` at `node` given the state at the top
    /// of its branch and the states at the ends of its child branches.
    ///
    /// Writes the child end of the branch above `node` and the parent ends
    /// of its children; the adjacent paths must be resampled afterwards.
    /// Observed tips are left unchanged.
    pub fn sample_child_state(
        &mut self,
        node: usize,
        sites: &[usize],
        rng: &mut RngHandle,
    ) -> Result<(), ChmError> {
        self.check_binary()?;
        self.check_node(node)?;
        self.check_sites(sites)?;
        if self.tree.is_tip(node) && self.tip_probabilities[node].is_none() {
            return Ok(());
        }
        let previous: Vec<usize> = self.histories[node].child_states();
        for attempt in 0..self.config.max_resample_attempts {
            let mut proposed = previous.clone();
            for &site in sites {
                let weights = self.node_state_weights(node, site);
                proposed[site] = sample_index(&weights, rng);
            }
            if self.config.forbid_extinction && count_occupied(&proposed) == 0 {
                trace!(node, attempt, "node state would empty the range");
                continue;
            }
            self.write_node_states(node, sites, &proposed);
            return Ok(());
        }
        Err(exhausted(
            "node-state-exhausted",
            node,
            self.config.max_resample_attempts,
        ))
    }

    /// Log probability of the current states of `sites` at `node` under the
    /// distribution used by [`HistoryCtmc::sample_child_state`].
    pub fn node_state_log_proposal(&self, node: usize, sites: &[usize]) -> Result<f64, ChmError> {
        self.check_binary()?;
        self.check_node(node)?;
        self.check_sites(sites)?;
        if self.tree.is_tip(node) && self.tip_probabilities[node].is_none() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for &site in sites {
            let weights = self.node_state_weights(node, site);
            let sum = weights[0] + weights[1];
            let state = self.histories[node].child_state(site);
            total += (weights[state] / sum).ln();
        }
        Ok(total)
    }

    /// Log density of the current events of `sites` on the branch above
    /// `node` under the sampler used by [`HistoryCtmc::resample_path`],
    /// with the remaining sites held as background.
    ///
    /// The endpoint-conditioning constant is not included; it cancels when
    /// the endpoints are unchanged.
    pub fn path_log_proposal(&self, node: usize, sites: &[usize]) -> Result<f64, ChmError> {
        self.check_node(node)?;
        self.check_sites(sites)?;
        if !self.scores_branch(node) {
            return Ok(0.0);
        }
        let history = &self.histories[node];
        let scalar = self.branch_scalar(node);
        let context = self.node_context(node);
        let mut state = history.parent_states();
        let mut occupied = count_occupied(&state);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut ln_prob = 0.0;
        let mut t = 0.0;
        for event in history.events() {
            let age = self.age_at(node, t);
            let total = self.generator.candidates(
                &state,
                occupied,
                sites,
                age,
                Some(&context),
                &mut candidates,
            );
            ln_prob -= total * (event.time - t) * scalar;
            if sites.contains(&event.site) {
                let rate = candidates
                    .iter()
                    .find(|candidate| candidate.site == event.site && candidate.state == event.state)
                    .map_or(0.0, |candidate| candidate.rate);
                ln_prob += rate.ln();
            }
            occupied = apply_event(&mut state, occupied, event);
            t = event.time;
        }
        let age = self.age_at(node, t);
        let total = self
            .generator
            .candidates(&state, occupied, sites, age, Some(&context), &mut candidates);
        ln_prob -= total * (1.0 - t) * scalar;
        Ok(ln_prob)
    }

    /// Closed-form log probability of the child-end states of `sites` given
    /// the parent-end states on the branch above `node`.
    pub fn endpoint_log_probability(&self, node: usize, sites: &[usize]) -> Result<f64, ChmError> {
        self.check_binary()?;
        self.check_node(node)?;
        self.check_sites(sites)?;
        if !self.scores_branch(node) {
            return Ok(0.0);
        }
        let scalar = self.branch_scalar(node);
        let history = &self.histories[node];
        Ok(sites
            .iter()
            .map(|&site| {
                self.site_closed_form(node, site, scalar)
                    .probability(history.parent_state(site), history.child_state(site))
                    .ln()
            })
            .sum())
    }

    /// Draws the states of an ambiguous tip from its observation
    /// probabilities alone.
    fn draw_tip_states(&self, tip: usize, rng: &mut RngHandle) -> Result<Vec<usize>, ChmError> {
        let Some(probs) = &self.tip_probabilities[tip] else {
            return Ok(self.histories[tip].child_states());
        };
        let mut proposed = vec![OFF_STATE; self.num_sites];
        for _ in 0..self.config.max_resample_attempts {
            for (site, &p) in probs.iter().enumerate() {
                proposed[site] = sample_index(&[1.0 - p, p], rng);
            }
            if !self.config.forbid_extinction || count_occupied(&proposed) > 0 {
                return Ok(proposed);
            }
        }
        Err(exhausted(
            "tip-state-exhausted",
            tip,
            self.config.max_resample_attempts,
        ))
    }

    /// Draws ambiguous tip states from their observation probabilities,
    /// samples internal node states from the tips upwards, then resamples
    /// every path. Exact tip states must be set beforehand.
    pub fn initialize(&mut self, rng: &mut RngHandle) -> Result<(), ChmError> {
        self.check_binary()?;
        let sites: Vec<usize> = (0..self.num_sites).collect();
        for tip in self.ambiguous_tips() {
            let proposed = self.draw_tip_states(tip, rng)?;
            self.write_node_states(tip, &sites, &proposed);
        }
        for node in self.tree.post_order() {
            if self.tree.is_tip(node) {
                continue;
            }
            let mut proposed = self.histories[node].child_states();
            let mut found = false;
            for _ in 0..self.config.max_resample_attempts {
                for &site in &sites {
                    let weights = self.subtree_weights(node, site, None);
                    proposed[site] = sample_index(&weights, rng);
                }
                if !self.config.forbid_extinction || count_occupied(&proposed) > 0 {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(exhausted(
                    "node-state-exhausted",
                    node,
                    self.config.max_resample_attempts,
                ));
            }
            self.write_node_states(node, &sites, &proposed);
        }
        if self.config.use_root_tail {
            self.sample_root_state(&sites, rng)?;
        }
        for node in self.tree.pre_order() {
            if !self.scores_branch(node) {
                continue;
            }
            let mut per_site = Ok(());
            for &site in &sites {
                per_site = self.resample_path(node, &[site], rng);
                if per_site.is_err() {
                    break;
                }
            }
            if per_site.is_err() {
                self.resample_path(node, &sites, rng)?;
            }
        }
        Ok(())
    }

    /// Log-likelihood of the path above `node`.
    ///
    /// Returns negative infinity for paths that are impossible: an endpoint
    /// mismatch, a no-op event or an instant with every site off while
    /// extinction is forbidden.
    pub fn branch_log_likelihood(&self, node: usize) -> f64 {
        if !self.scores_branch(node) {
            return 0.0;
        }
        let history = &self.histories[node];
        let scalar = self.branch_scalar(node);
        let context = self.node_context(node);
        let forbid = self.config.forbid_extinction;
        let mut state = history.parent_states();
        let mut occupied = count_occupied(&state);
        if forbid && occupied == 0 {
            return f64::NEG_INFINITY;
        }

        let mut ln_prob = 0.0;
        let mut t = 0.0;
        for event in history.events() {
            let age = self.age_at(node, t);
            let total = self.generator.sum_of_rates(&state, occupied, age, Some(&context));
            let rate = self
                .generator
                .allowed_rate(&state, occupied, event, age, Some(&context));
            ln_prob += rate.ln() - total * (event.time - t) * scalar;
            occupied = apply_event(&mut state, occupied, event);
            if forbid && occupied == 0 {
                return f64::NEG_INFINITY;
            }
            t = event.time;
        }
        let age = self.age_at(node, t);
        let total = self.generator.sum_of_rates(&state, occupied, age, Some(&context));
        ln_prob -= total * (1.0 - t) * scalar;

        if state != history.child_states() {
            return f64::NEG_INFINITY;
        }
        ln_prob
    }

    /// Joint log-probability of every history: root frequencies, branch
    /// paths, endpoint agreement between adjacent branches and the
    /// ambiguous tip observations.
    pub fn compute_log_probability(&self) -> f64 {
        let root = self.tree.root();
        let root_history = &self.histories[root];
        if !self.config.use_root_tail && root_history.parent_states() != root_history.child_states()
        {
            return f64::NEG_INFINITY;
        }
        let mut ln_prob: f64 = root_history
            .parent_states()
            .iter()
            .map(|&state| self.root_frequencies[state].ln())
            .sum();
        for node in 0..self.tree.num_nodes() {
            if let Some(parent) = self.tree.parent(node) {
                if self.histories[node].parent_states() != self.histories[parent].child_states() {
                    return f64::NEG_INFINITY;
                }
            }
            ln_prob += self.branch_log_likelihood(node);
            if ln_prob == f64::NEG_INFINITY {
                return ln_prob;
            }
        }
        ln_prob + self.tip_observation_log_probability()
    }

    fn forward_path(
        &self,
        node: usize,
        start: &[usize],
        sites: &[usize],
        background: &[CharacterEvent],
        rng: &mut RngHandle,
    ) -> (Vec<CharacterEvent>, Vec<usize>) {
        let scalar = self.branch_scalar(node);
        let context = self.node_context(node);
        let mut state = start.to_vec();
        let mut occupied = count_occupied(&state);
        let mut events = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut next_background = 0;
        let mut t = 0.0;
        loop {
            let age = self.age_at(node, t);
            let total = self.generator.candidates(
                &state,
                occupied,
                sites,
                age,
                Some(&context),
                &mut candidates,
            );
            let horizon = background
                .get(next_background)
                .map(|event| event.time)
                .unwrap_or(1.0);
            let wait = rng.exponential(total * scalar);
            if t + wait >= horizon {
                match background.get(next_background) {
                    Some(event) => {
                        occupied = apply_event(&mut state, occupied, event);
                        t = event.time;
                        next_background += 1;
                        continue;
                    }
                    None => break,
                }
            }
            t += wait;
            let chosen = choose_candidate(&candidates, total, rng);
            let event = CharacterEvent::new(chosen.site, chosen.state, t);
            occupied = apply_event(&mut state, occupied, &event);
            events.push(event);
        }
        (events, state)
    }

    /// Two-state transition of `site` on the branch above `node`, with the
    /// independent-site rates taken at the branch midpoint age.
    fn site_closed_form(&self, node: usize, site: usize, scaled_time: f64) -> TwoStateTransition {
        let age = self.age_at(node, 0.5);
        TwoStateTransition::new(
            self.generator.site_rate(1, OFF_STATE, site, age),
            self.generator.site_rate(OFF_STATE, 1, site, age),
            scaled_time,
        )
    }

    fn subtree_weights(&self, node: usize, site: usize, prior: Option<[f64; 2]>) -> [f64; 2] {
        let mut weights = prior.unwrap_or([1.0, 1.0]);
        for &child in self.tree.children(node) {
            let transition = self.site_closed_form(child, site, self.branch_scalar(child));
            let below = self.histories[child].child_state(site);
            for (state, weight) in weights.iter_mut().enumerate() {
                *weight *= transition.probability(state, below);
            }
        }
        if let Some(probs) = &self.tip_probabilities[node] {
            weights[0] *= 1.0 - probs[site];
            weights[1] *= probs[site];
        }
        if weights[0] + weights[1] <= 0.0 {
            return [0.5, 0.5];
        }
        weights
    }

    fn node_state_weights(&self, node: usize, site: usize) -> [f64; 2] {
        let root = self.tree.root();
        let prior = if node == root {
            if self.config.use_root_tail {
                let above = self.histories[root].parent_state(site);
                self.site_closed_form(root, site, self.config.root_sampling_length)
                    .row(above)
            } else {
                [self.root_frequencies[0], self.root_frequencies[1]]
            }
        } else {
            let above = self.histories[node].parent_state(site);
            self.site_closed_form(node, site, self.branch_scalar(node))
                .row(above)
        };
        self.subtree_weights(node, site, Some(prior))
    }

    fn write_node_states(&mut self, node: usize, sites: &[usize], states: &[usize]) {
        let root = self.tree.root();
        let children: Vec<usize> = self.tree.children(node).to_vec();
        for &site in sites {
            let state = states[site];
            self.histories[node].set_child_state(site, state);
            if node == root && !self.config.use_root_tail {
                self.histories[node].set_parent_state(site, state);
            }
            for &child in &children {
                self.histories[child].set_parent_state(site, state);
            }
        }
    }

    fn check_node(&self, node: usize) -> Result<(), ChmError> {
        if node >= self.tree.num_nodes() {
            return Err(ChmError::Model(
                ErrorInfo::new("node-out-of-range", "node index exceeds tree size")
                    .with_context("node", node.to_string())
                    .with_context("nodes", self.tree.num_nodes().to_string()),
            ));
        }
        Ok(())
    }

    fn check_tip(&self, node: usize, len: usize) -> Result<(), ChmError> {
        self.check_node(node)?;
        if !self.tree.is_tip(node) {
            return Err(ChmError::Config(
                ErrorInfo::new("not-a-tip", "tip data supplied for an internal node")
                    .with_context("node", node.to_string()),
            ));
        }
        if len != self.num_sites {
            return Err(ChmError::Config(
                ErrorInfo::new("tip-length", "tip data must cover every site")
                    .with_context("node", node.to_string())
                    .with_context("expected", self.num_sites.to_string())
                    .with_context("found", len.to_string()),
            ));
        }
        Ok(())
    }

    fn check_sites(&self, sites: &[usize]) -> Result<(), ChmError> {
        if let Some(site) = sites.iter().find(|&&site| site >= self.num_sites) {
            return Err(ChmError::Model(
                ErrorInfo::new("site-out-of-range", "site index exceeds site count")
                    .with_context("site", site.to_string())
                    .with_context("num_sites", self.num_sites.to_string()),
            ));
        }
        Ok(())
    }

    fn check_binary(&self) -> Result<(), ChmError> {
        if self.generator.num_states() != 2 {
            return Err(ChmError::Model(
                ErrorInfo::new(
                    "closed-form-binary-only",
                    "closed-form endpoint sampling needs exactly two states",
                )
                .with_context("states", self.generator.num_states().to_string()),
            ));
        }
        Ok(())
    }
}

fn apply_event(state: &mut [usize], occupied: usize, event: &CharacterEvent) -> usize {
    let before = state[event.site] != OFF_STATE;
    let after = event.state != OFF_STATE;
    state[event.site] = event.state;
    match (before, after) {
        (true, false) => occupied - 1,
        (false, true) => occupied + 1,
        _ => occupied,
    }
}

fn choose_candidate(candidates: &[Candidate], total: f64, rng: &mut RngHandle) -> Candidate {
    let mut remainder = rng.uniform() * total;
    for candidate in candidates {
        remainder -= candidate.rate;
        if remainder <= 0.0 {
            return *candidate;
        }
    }
    // rounding left a sliver of mass past the last candidate
    candidates[candidates.len() - 1]
}

fn sample_index(weights: &[f64], rng: &mut RngHandle) -> usize {
    let total: f64 = weights.iter().sum();
    let mut remainder = rng.uniform() * total;
    for (index, weight) in weights.iter().enumerate() {
        remainder -= weight;
        if remainder <= 0.0 && *weight > 0.0 {
            return index;
        }
    }
    weights
        .iter()
        .rposition(|&weight| weight > 0.0)
        .unwrap_or(0)
}

fn normalize_frequencies(freqs: &[f64], num_states: usize) -> Result<Vec<f64>, ChmError> {
    if freqs.len() != num_states {
        return Err(ChmError::Config(
            ErrorInfo::new("root-frequency-length", "one root frequency is required per state")
                .with_context("expected", num_states.to_string())
                .with_context("found", freqs.len().to_string()),
        ));
    }
    if freqs.iter().any(|f| !f.is_finite() || *f < 0.0) {
        return Err(ChmError::Config(ErrorInfo::new(
            "root-frequency-value",
            "root frequencies must be finite and non-negative",
        )));
    }
    let total: f64 = freqs.iter().sum();
    if total <= 0.0 {
        return Err(ChmError::Config(ErrorInfo::new(
            "root-frequency-sum",
            "root frequencies must not all be zero",
        )));
    }
    Ok(freqs.iter().map(|f| f / total).collect())
}

fn exhausted(code: &str, node: usize, attempts: usize) -> ChmError {
    ChmError::Sampling(
        ErrorInfo::new(code, "endpoint-conditioned sampling did not produce a match")
            .with_context("node", node.to_string())
            .with_context("attempts", attempts.to_string())
            .with_hint("raise max_resample_attempts or shorten the site subset"),
    )
}
