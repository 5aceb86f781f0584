//! YAML description of a tree, its rates and the observed tip data.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::Tree;
use chm_ctmc::{HistoryConfig, HistoryCtmc, ModifierConfig, RateGenerator, RateMatrix};
use serde::{Deserialize, Serialize};

/// Number of states of a presence/absence character.
const BINARY_STATES: usize = 2;

/// Tree given as parent indices and branch lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Parent of every node, `-1` for the root.
    pub parents: Vec<i64>,
    /// Length of the branch above every node.
    pub lengths: Vec<f64>,
    /// Optional per-branch rate multipliers.
    #[serde(default)]
    pub branch_rates: Option<Vec<f64>>,
}

/// Base binary rates and the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    /// Rate of switching a site on.
    pub gain: f64,
    /// Rate of switching a site off.
    pub loss: f64,
    /// Global clock rate.
    #[serde(default = "default_clock")]
    pub clock: f64,
}

fn default_clock() -> f64 {
    1.0
}

/// Observation at one tip: either exact states or per-site probabilities
/// of the site being on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipConfig {
    /// Tip node index.
    pub node: usize,
    /// Observed states.
    #[serde(default)]
    pub states: Option<Vec<usize>>,
    /// Probability that each site is on.
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
}

/// Everything needed to build a history engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Tree shape.
    pub tree: TreeConfig,
    /// Base rates.
    pub rates: RateConfig,
    /// Number of sites per character.
    pub sites: usize,
    /// Rate modifiers applied in order.
    #[serde(default)]
    pub modifiers: Vec<ModifierConfig>,
    /// Tip observations; may be empty for pure simulation.
    #[serde(default)]
    pub tips: Vec<TipConfig>,
    /// Engine options.
    #[serde(default)]
    pub history: HistoryConfig,
}

impl ScenarioConfig {
    /// Parses a scenario from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ChmError> {
        serde_yaml::from_str(text)
            .map_err(|err| ChmError::Serde(ErrorInfo::new("scenario-parse", err.to_string())))
    }

    /// Loads a scenario file.
    pub fn load(path: &Path) -> Result<Self, ChmError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("scenario-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            ChmError::Serde(info) => {
                ChmError::Serde(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Builds the engine with tip data applied; histories are left unset.
    pub fn build(&self) -> Result<HistoryCtmc, ChmError> {
        let tree = Tree::from_parent_indices(&self.tree.parents, &self.tree.lengths)?;
        let mut generator = RateGenerator::new(
            RateMatrix::binary(self.rates.gain, self.rates.loss)?,
            self.rates.clock,
        )?;
        for modifier in &self.modifiers {
            generator = generator.with_modifier(modifier.build(
                self.sites,
                BINARY_STATES,
                self.history.forbid_extinction,
            )?);
        }
        let num_nodes = tree.num_nodes();
        let mut ctmc =
            HistoryCtmc::new(Arc::new(tree), generator, self.sites, self.history.clone())?;

        if let Some(rates) = &self.tree.branch_rates {
            if rates.len() != num_nodes {
                return Err(ChmError::Config(
                    ErrorInfo::new("branch-rate-count", "one branch rate per node is required")
                        .with_context("nodes", num_nodes.to_string())
                        .with_context("rates", rates.len().to_string()),
                ));
            }
            for (node, &rate) in rates.iter().enumerate() {
                ctmc.set_branch_rate(node, rate)?;
            }
        }

        for tip in &self.tips {
            match (&tip.states, &tip.probabilities) {
                (Some(states), None) => ctmc.set_tip_states(tip.node, states)?,
                (None, Some(probabilities)) => {
                    ctmc.set_tip_probabilities(tip.node, probabilities.clone())?
                }
                _ => {
                    return Err(ChmError::Config(
                        ErrorInfo::new("tip-data", "give exactly one of states or probabilities")
                            .with_context("node", tip.node.to_string()),
                    ))
                }
            }
        }
        Ok(ctmc)
    }
}
