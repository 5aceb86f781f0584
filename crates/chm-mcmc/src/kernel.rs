use std::fs;
use std::path::{Path, PathBuf};

use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::RngHandle;
use chm_ctmc::HistoryCtmc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain::Chain;
use crate::config::RunConfig;
use crate::determinism;
use crate::manifest::RunManifest;
use crate::metrics::{SharedTrace, TraceMonitor, TraceRecorder, TraceRow};
use crate::model::HistoryModel;
use crate::moves_history::{NodeResampleMove, PathResampleMove, TipResampleMove};
use crate::moves_scale::ClockScaleMove;
use crate::scheduler::{CoupledScheduler, RunSummary, SchedulerOptions, SwapStats};

/// Outcome of a history inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Scheduler state at the end of the run.
    pub summary: RunSummary,
    /// Swap counters of the burn-in alone.
    pub burnin_swaps: SwapStats,
    /// Mean log posterior over the recorded trace.
    pub mean_ln_posterior: Option<f64>,
    /// Recorded trace rows.
    #[serde(skip)]
    pub trace: Vec<TraceRow>,
    /// Trace CSV written during the run.
    pub trace_path: Option<PathBuf>,
    /// Summary JSON written during the run.
    pub summary_path: Option<PathBuf>,
    /// Manifest written during the run.
    pub manifest_path: Option<PathBuf>,
}

/// Runs Metropolis-coupled inference over the histories of `template`.
///
/// `template` must carry the tip data; every chain starts from its own
/// initialisation of the internal states and paths. When
/// `config.output.run_directory` is set the trace, summary and manifest are
/// written there.
pub fn run(
    config: &RunConfig,
    template: &HistoryCtmc,
    scenario: Option<&Path>,
) -> Result<RunReport, ChmError> {
    config.validate()?;
    let master_seed = config.seed_policy.master_seed;
    let recorder = TraceRecorder::shared();
    let mut chains = Vec::with_capacity(config.ladder.chains);
    for index in 0..config.ladder.chains {
        chains.push(build_chain(config, template, index, master_seed, &recorder)?);
    }
    let mut scheduler = CoupledScheduler::new(chains, SchedulerOptions::from_config(config))?;

    let burnin_swaps = scheduler.burnin(config.burnin, config.tuning_interval)?;
    if config.ladder.tune && burnin_swaps.attempted > 0 {
        scheduler.tune_ladder(burnin_swaps.rate());
    }
    scheduler.run(config.generations)?;

    let (trace, mean_ln_posterior) = {
        let recorder = recorder.lock().map_err(|_| {
            ChmError::Model(ErrorInfo::new("trace-lock", "trace recorder lock poisoned"))
        })?;
        (recorder.rows().to_vec(), recorder.mean_ln_posterior())
    };
    let mut report = RunReport {
        summary: scheduler.summary(),
        burnin_swaps,
        mean_ln_posterior,
        trace,
        trace_path: None,
        summary_path: None,
        manifest_path: None,
    };

    if let Some(run_dir) = &config.output.run_directory {
        write_outputs(config, scenario, run_dir, &recorder, &mut report)?;
    }
    info!(
        generations = report.summary.generations,
        cold_ln_posterior = report.summary.cold_ln_posterior,
        swap_rate = report.summary.swaps.rate(),
        "run complete"
    );
    Ok(report)
}

fn build_chain(
    config: &RunConfig,
    template: &HistoryCtmc,
    index: usize,
    master_seed: u64,
    recorder: &SharedTrace,
) -> Result<Chain<HistoryModel>, ChmError> {
    let mut ctmc = template.clone();
    let mut init_rng = RngHandle::from_seed(determinism::init_seed(master_seed, index));
    ctmc.initialize(&mut init_rng)?;
    let model = HistoryModel::new(ctmc, config.clock_prior)?;
    let weights = &config.moves;
    let mut chain = Chain::new(model)
        .with_monitor(TraceMonitor::new(recorder.clone(), index, config.thinning));
    if weights.path_resample > 0 {
        chain.add_move(Box::new(PathResampleMove::new()), weights.path_resample);
    }
    if weights.node_resample > 0 {
        chain.add_move(Box::new(NodeResampleMove::new()), weights.node_resample);
    }
    if weights.tip_resample > 0 && !template.ambiguous_tips().is_empty() {
        chain.add_move(Box::new(TipResampleMove::new()), weights.tip_resample);
    }
    if weights.clock_scale > 0 {
        chain.add_move(
            Box::new(ClockScaleMove::new(weights.clock_lambda)?),
            weights.clock_scale,
        );
    }
    Ok(chain)
}

fn write_outputs(
    config: &RunConfig,
    scenario: Option<&Path>,
    run_dir: &Path,
    recorder: &SharedTrace,
    report: &mut RunReport,
) -> Result<(), ChmError> {
    fs::create_dir_all(run_dir).map_err(|err| {
        ChmError::Serde(
            ErrorInfo::new("run-dir-create", err.to_string())
                .with_context("path", run_dir.display().to_string()),
        )
    })?;
    let output = &config.output;
    let trace_path = run_dir.join(&output.trace_file);
    let summary_path = run_dir.join(&output.summary_file);
    let manifest_path = run_dir.join(&output.manifest_file);

    recorder
        .lock()
        .map_err(|_| ChmError::Model(ErrorInfo::new("trace-lock", "trace recorder lock poisoned")))?
        .write_csv(&trace_path)?;
    report.trace_path = Some(trace_path);
    report.summary_path = Some(summary_path.clone());
    report.manifest_path = Some(manifest_path.clone());

    let json = serde_json::to_string_pretty(&*report).map_err(|err| {
        ChmError::Serde(
            ErrorInfo::new("summary-serialize", err.to_string())
                .with_context("path", summary_path.display().to_string()),
        )
    })?;
    fs::write(&summary_path, json).map_err(|err| {
        ChmError::Serde(
            ErrorInfo::new("summary-write", err.to_string())
                .with_context("path", summary_path.display().to_string()),
        )
    })?;

    let mut manifest = RunManifest::new(config)?;
    manifest.scenario = scenario.map(Path::to_path_buf);
    manifest.trace_file = Some(output.trace_file.clone());
    manifest.summary_file = Some(output.summary_file.clone());
    manifest.write(&manifest_path)
}
