use std::fs;
use std::path::{Path, PathBuf};

use chm_core::errors::{ChmError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::tempering::SwapRule;

/// YAML-configurable parameters governing a coupled run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of generations to sample after burn-in.
    pub generations: usize,
    /// Number of burn-in generations (no monitor output, moves are tuned).
    #[serde(default)]
    pub burnin: usize,
    /// Interval in burn-in generations between move tuning passes (0 disables tuning).
    #[serde(default = "default_tuning_interval")]
    pub tuning_interval: usize,
    /// Interval in generations between swap attempts.
    #[serde(default = "default_swap_interval")]
    pub swap_interval: usize,
    /// Interval at which the trace records the active chain.
    #[serde(default = "default_thinning")]
    pub thinning: usize,
    /// Heat ladder settings.
    #[serde(default)]
    pub ladder: LadderConfig,
    /// Comparison used when a swap falls in the stochastic band.
    #[serde(default)]
    pub swap_rule: SwapRule,
    /// Number of proposals of each move type per cycle.
    #[serde(default)]
    pub moves: MoveWeights,
    /// Prior on the clock rate.
    #[serde(default)]
    pub clock_prior: ClockPrior,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_tuning_interval() -> usize {
    50
}

fn default_swap_interval() -> usize {
    10
}

fn default_thinning() -> usize {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            generations: 1000,
            burnin: 0,
            tuning_interval: default_tuning_interval(),
            swap_interval: default_swap_interval(),
            thinning: default_thinning(),
            ladder: LadderConfig::default(),
            swap_rule: SwapRule::default(),
            moves: MoveWeights::default(),
            clock_prior: ClockPrior::default(),
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml_str(text: &str) -> Result<Self, ChmError> {
        let config: RunConfig = serde_yaml::from_str(text)
            .map_err(|err| ChmError::Serde(ErrorInfo::new("config-parse", err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ChmError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("config-read", err.to_string())
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

    /// Checks every field against its valid domain.
    pub fn validate(&self) -> Result<(), ChmError> {
        if self.swap_interval == 0 {
            return Err(invalid("swap-interval", "swap_interval must be at least 1"));
        }
        if self.thinning == 0 {
            return Err(invalid("thinning", "thinning must be at least 1"));
        }
        self.ladder.validate()?;
        self.moves.validate()?;
        self.clock_prior.validate()
    }
}

/// Heat ladder construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Number of chains in the ladder.
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Heat spacing: chain `i` runs at `1 / (1 + delta * i)`.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Tune `delta` from the burn-in swap acceptance rate.
    #[serde(default)]
    pub tune: bool,
    /// Worker threads used to advance chains (0 means one per chain).
    #[serde(default)]
    pub threads: usize,
}

fn default_chains() -> usize {
    4
}

fn default_delta() -> f64 {
    0.2
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            delta: default_delta(),
            tune: false,
            threads: 0,
        }
    }
}

impl LadderConfig {
    /// Checks the chain count and heat spacing.
    pub fn validate(&self) -> Result<(), ChmError> {
        if self.chains == 0 {
            return Err(invalid("empty-ladder", "at least one chain is required"));
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(ChmError::Config(
                ErrorInfo::new("ladder-delta", "delta must be finite and non-negative")
                    .with_context("delta", self.delta.to_string()),
            ));
        }
        Ok(())
    }
}

/// Number of proposals per move type performed within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveWeights {
    /// Single-site path resampling proposals.
    #[serde(default = "default_path_weight")]
    pub path_resample: usize,
    /// Single-site node state proposals.
    #[serde(default = "default_node_weight")]
    pub node_resample: usize,
    /// Single-site proposals at ambiguous tips; unused when every tip is
    /// observed exactly.
    #[serde(default = "default_tip_weight")]
    pub tip_resample: usize,
    /// Clock rate scale proposals.
    #[serde(default = "default_clock_weight")]
    pub clock_scale: usize,
    /// Initial tuning parameter of the clock scale move.
    #[serde(default = "default_clock_lambda")]
    pub clock_lambda: f64,
}

fn default_path_weight() -> usize {
    10
}

fn default_node_weight() -> usize {
    5
}

fn default_tip_weight() -> usize {
    2
}

fn default_clock_weight() -> usize {
    1
}

fn default_clock_lambda() -> f64 {
    1.0
}

impl Default for MoveWeights {
    fn default() -> Self {
        Self {
            path_resample: default_path_weight(),
            node_resample: default_node_weight(),
            tip_resample: default_tip_weight(),
            clock_scale: default_clock_weight(),
            clock_lambda: default_clock_lambda(),
        }
    }
}

impl MoveWeights {
    fn validate(&self) -> Result<(), ChmError> {
        if !self.clock_lambda.is_finite() || self.clock_lambda <= 0.0 {
            return Err(invalid("clock-lambda", "clock_lambda must be finite and positive"));
        }
        Ok(())
    }
}

/// Prior placed on the clock rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClockPrior {
    /// Exponential prior with the given rate.
    Exponential {
        /// Rate of the exponential distribution.
        rate: f64,
    },
    /// Uniform prior on `[min, max]`.
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl Default for ClockPrior {
    fn default() -> Self {
        ClockPrior::Exponential { rate: 1.0 }
    }
}

impl ClockPrior {
    /// Log density at `value`; negative infinity outside the support.
    pub fn ln_density(&self, value: f64) -> f64 {
        match *self {
            ClockPrior::Exponential { rate } => {
                if value < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    rate.ln() - rate * value
                }
            }
            ClockPrior::Uniform { min, max } => {
                if value < min || value > max {
                    f64::NEG_INFINITY
                } else {
                    -(max - min).ln()
                }
            }
        }
    }

    /// Checks the prior parameters.
    pub fn validate(&self) -> Result<(), ChmError> {
        let valid = match *self {
            ClockPrior::Exponential { rate } => rate.is_finite() && rate > 0.0,
            ClockPrior::Uniform { min, max } => {
                min.is_finite() && max.is_finite() && min >= 0.0 && max > min
            }
        };
        if valid {
            Ok(())
        } else {
            Err(ChmError::Config(
                ErrorInfo::new("clock-prior", "clock prior parameters are out of range")
                    .with_context("prior", format!("{self:?}")),
            ))
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in manifests.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Created if it does not exist.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Trace filename relative to `run_directory`.
    #[serde(default = "default_trace_filename")]
    pub trace_file: PathBuf,
    /// Summary filename relative to `run_directory`.
    #[serde(default = "default_summary_filename")]
    pub summary_file: PathBuf,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
}

fn default_trace_filename() -> PathBuf {
    PathBuf::from("trace.csv")
}

fn default_summary_filename() -> PathBuf {
    PathBuf::from("summary.json")
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            trace_file: default_trace_filename(),
            summary_file: default_summary_filename(),
            manifest_file: default_manifest_filename(),
        }
    }
}

fn invalid(code: &str, message: &str) -> ChmError {
    ChmError::Config(ErrorInfo::new(code, message))
}
