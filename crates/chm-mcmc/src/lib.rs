#![deny(missing_docs)]
#![doc = "Metropolis-coupled MCMC over character histories: heated chains on a ladder, periodic swaps and history moves."]

/// Chain, model, move and monitor boundary.
pub mod chain;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// End-to-end driver for history inference runs.
pub mod kernel;
/// Run manifest serialization helpers.
pub mod manifest;
/// Trace monitors and CSV export.
pub mod metrics;
/// Character-history model wrapper.
pub mod model;
/// Endpoint-conditioned history proposals.
pub mod moves_history;
/// Multiplicative scale proposals.
pub mod moves_scale;
/// Coupled-chain scheduler.
pub mod scheduler;
/// Heat ladder and swap acceptance helpers.
pub mod tempering;
/// Proposal step tuning.
pub mod tuning;

pub use chain::{Chain, Model, Monitor, Move, MoveStats, OperatorRow};
pub use config::{ClockPrior, LadderConfig, MoveWeights, OutputConfig, RunConfig, SeedPolicy};
pub use kernel::{run, RunReport};
pub use metrics::{SharedTrace, TraceMonitor, TraceRecorder, TraceRow};
pub use model::HistoryModel;
pub use moves_history::{NodeResampleMove, PathResampleMove, TipResampleMove};
pub use moves_scale::ClockScaleMove;
pub use scheduler::{CoupledScheduler, RunSummary, SchedulerOptions, SwapStats};
pub use tempering::SwapRule;
