//! Command implementations behind the `chm-sim` binary.

pub mod commands;
pub mod logging;
pub mod scenario;

pub use scenario::{RateConfig, ScenarioConfig, TipConfig, TreeConfig};
