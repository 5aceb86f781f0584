//! Endpoint-conditioned proposals on the latent histories.

use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::RngHandle;
use chm_ctmc::{BranchHistory, HistoryCtmc};

use crate::chain::Move;
use crate::model::HistoryModel;

/// Redraws the path of one site on one branch, keeping both endpoints.
#[derive(Debug, Default)]
pub struct PathResampleMove {
    saved: Option<(usize, BranchHistory)>,
}

impl PathResampleMove {
    /// Creates the move.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Move<HistoryModel> for PathResampleMove {
    fn name(&self) -> &str {
        "path-resample"
    }

    fn propose(&mut self, model: &mut HistoryModel, rng: &mut RngHandle) -> Result<f64, ChmError> {
        let ctmc = model.ctmc_mut();
        let branches: Vec<usize> = (0..ctmc.tree().num_nodes())
            .filter(|&node| ctmc.scores_branch(node))
            .collect();
        if branches.is_empty() {
            return Err(ChmError::Sampling(ErrorInfo::new(
                "no-scored-branch",
                "tree has no branch carrying a path",
            )));
        }
        let node = branches[rng.index(branches.len())];
        let sites = [rng.index(ctmc.num_sites())];

        let old = ctmc.path_log_proposal(node, &sites)?;
        self.saved = Some((node, ctmc.history(node).clone()));
        ctmc.resample_path(node, &sites, rng)?;
        let new = ctmc.path_log_proposal(node, &sites)?;
        Ok(old - new)
    }

    fn accept(&mut self, _model: &mut HistoryModel) {
        self.saved = None;
    }

    fn reject(&mut self, model: &mut HistoryModel) {
        if let Some((node, history)) = self.saved.take() {
            model.ctmc_mut().restore_history(node, history);
        }
    }
}

/// Redraws the state of one site at an internal node, then the paths of
/// that site on the adjacent branches.
///
/// The Hastings ratio treats the closed-form endpoint probabilities as the
/// normalising constants of the conditioned paths.
#[derive(Debug, Default)]
pub struct NodeResampleMove {
    saved: Vec<(usize, BranchHistory)>,
}

impl NodeResampleMove {
    /// Creates the move.
    pub fn new() -> Self {
        Self::default()
    }
}

fn affected_branches(ctmc: &HistoryCtmc, node: usize) -> Vec<usize> {
    let mut branches = vec![node];
    branches.extend_from_slice(ctmc.tree().children(node));
    branches
}

fn neighbourhood_log_proposal(
    ctmc: &HistoryCtmc,
    node: usize,
    branches: &[usize],
    sites: &[usize],
) -> Result<f64, ChmError> {
    let mut total = ctmc.node_state_log_proposal(node, sites)?;
    for &branch in branches {
        total += ctmc.path_log_proposal(branch, sites)?;
        total -= ctmc.endpoint_log_probability(branch, sites)?;
    }
    Ok(total)
}

/// Redraws `sites` at `node` and on the branches touching it, saving those
/// branches first. Returns the log Hastings ratio.
fn resample_neighbourhood(
    ctmc: &mut HistoryCtmc,
    node: usize,
    sites: &[usize],
    saved: &mut Vec<(usize, BranchHistory)>,
    rng: &mut RngHandle,
) -> Result<f64, ChmError> {
    let branches = affected_branches(ctmc, node);
    let old = neighbourhood_log_proposal(ctmc, node, &branches, sites)?;
    saved.clear();
    saved.extend(
        branches
            .iter()
            .map(|&branch| (branch, ctmc.history(branch).clone())),
    );
    ctmc.sample_child_state(node, sites, rng)?;
    for &branch in &branches {
        ctmc.resample_path(branch, sites, rng)?;
    }
    let new = neighbourhood_log_proposal(ctmc, node, &branches, sites)?;
    Ok(old - new)
}

impl Move<HistoryModel> for NodeResampleMove {
    fn name(&self) -> &str {
        "node-resample"
    }

    fn propose(&mut self, model: &mut HistoryModel, rng: &mut RngHandle) -> Result<f64, ChmError> {
        let ctmc = model.ctmc_mut();
        let tree = ctmc.tree();
        let internal: Vec<usize> = (0..tree.num_nodes())
            .filter(|&node| !tree.is_tip(node))
            .collect();
        if internal.is_empty() {
            return Err(ChmError::Sampling(ErrorInfo::new(
                "no-internal-node",
                "tree has no internal node",
            )));
        }
        let node = internal[rng.index(internal.len())];
        let sites = [rng.index(ctmc.num_sites())];
        resample_neighbourhood(ctmc, node, &sites, &mut self.saved, rng)
    }

    fn accept(&mut self, _model: &mut HistoryModel) {
        self.saved.clear();
    }

    fn reject(&mut self, model: &mut HistoryModel) {
        let ctmc = model.ctmc_mut();
        for (branch, history) in self.saved.drain(..) {
            ctmc.restore_history(branch, history);
        }
    }
}

/// Redraws one site of an ambiguous tip from its observation probability
/// and the state above it, then the path of that site on the tip branch.
#[derive(Debug, Default)]
pub struct TipResampleMove {
    saved: Vec<(usize, BranchHistory)>,
}

impl TipResampleMove {
    /// Creates the move.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Move<HistoryModel> for TipResampleMove {
    fn name(&self) -> &str {
        "tip-resample"
    }

    fn propose(&mut self, model: &mut HistoryModel, rng: &mut RngHandle) -> Result<f64, ChmError> {
        let ctmc = model.ctmc_mut();
        let tips = ctmc.ambiguous_tips();
        if tips.is_empty() {
            return Err(ChmError::Sampling(ErrorInfo::new(
                "no-ambiguous-tip",
                "no tip carries observation probabilities",
            )));
        }
        let tip = tips[rng.index(tips.len())];
        let sites = [rng.index(ctmc.num_sites())];
        resample_neighbourhood(ctmc, tip, &sites, &mut self.saved, rng)
    }

    fn accept(&mut self, _model: &mut HistoryModel) {
        self.saved.clear();
    }

    fn reject(&mut self, model: &mut HistoryModel) {
        let ctmc = model.ctmc_mut();
        for (branch, history) in self.saved.drain(..) {
            ctmc.restore_history(branch, history);
        }
    }
}
