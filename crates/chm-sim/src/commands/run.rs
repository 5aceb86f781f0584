use std::error::Error;
use std::path::PathBuf;

use chm_mcmc::{kernel, RunConfig, RunReport};
use clap::Args as ClapArgs;
use tracing::info;

use crate::scenario::ScenarioConfig;

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// YAML scenario with the tree, rates and tip data.
    #[arg(long)]
    pub scenario: PathBuf,
    /// Output directory; overrides `output.run_directory`.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Overrides the master seed of the configuration.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &RunArgs) -> Result<RunReport, Box<dyn Error>> {
    let mut config = RunConfig::load(&args.config)?;
    if let Some(out) = &args.out {
        config.output.run_directory = Some(out.clone());
    }
    if let Some(seed) = args.seed {
        config.seed_policy.master_seed = seed;
    }
    let scenario = ScenarioConfig::load(&args.scenario)?;
    let template = scenario.build()?;
    info!(
        scenario = %args.scenario.display(),
        sites = scenario.sites,
        chains = config.ladder.chains,
        "starting run"
    );
    let report = kernel::run(&config, &template, Some(&args.scenario))?;
    Ok(report)
}
