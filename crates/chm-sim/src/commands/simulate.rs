use std::error::Error;
use std::path::PathBuf;

use chm_core::RngHandle;
use chm_mcmc::determinism;
use clap::Args as ClapArgs;
use serde::Serialize;

use crate::scenario::ScenarioConfig;

#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    /// YAML scenario; tip data in it is ignored.
    #[arg(long)]
    pub scenario: PathBuf,
    /// Master seed for the simulation stream.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipStates {
    pub node: usize,
    pub states: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchEvents {
    pub node: usize,
    pub events: usize,
}

/// Forward simulation output printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub root_states: Vec<usize>,
    pub tips: Vec<TipStates>,
    pub branches: Vec<BranchEvents>,
    pub ln_probability: f64,
}

pub fn run(args: &SimulateArgs) -> Result<SimulationReport, Box<dyn Error>> {
    let scenario = ScenarioConfig::load(&args.scenario)?;
    let mut ctmc = scenario.build()?;
    let mut rng = RngHandle::from_seed(determinism::simulation_seed(args.seed));
    ctmc.simulate_tree(&mut rng)?;

    let tree = ctmc.tree();
    let tips = tree
        .tips()
        .into_iter()
        .map(|node| TipStates {
            node,
            states: ctmc.history(node).child_states(),
        })
        .collect();
    let branches = (0..tree.num_nodes())
        .filter(|&node| ctmc.scores_branch(node))
        .map(|node| BranchEvents {
            node,
            events: ctmc.history(node).num_events(),
        })
        .collect();
    Ok(SimulationReport {
        seed: args.seed,
        root_states: ctmc.history(tree.root()).child_states(),
        tips,
        branches,
        ln_probability: ctmc.compute_log_probability(),
    })
}
