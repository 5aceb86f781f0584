use std::fs;
use std::path::{Path, PathBuf};

use chm_core::errors::{ChmError, ErrorInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RunConfig;

/// Structured manifest describing a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// SHA-256 of the JSON-serialised configuration.
    pub config_hash: String,
    /// Master seed used to derive chain substreams.
    pub master_seed: u64,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// Scenario file the run was built from, if any.
    pub scenario: Option<PathBuf>,
    /// Trace file produced during the run (relative to the run directory).
    pub trace_file: Option<PathBuf>,
    /// Summary file produced during the run (relative to the run directory).
    pub summary_file: Option<PathBuf>,
}

impl RunManifest {
    /// Builds a manifest for `config`, hashing its canonical JSON form.
    pub fn new(config: &RunConfig) -> Result<Self, ChmError> {
        Ok(Self {
            config_hash: config_hash(config)?,
            master_seed: config.seed_policy.master_seed,
            seed_label: config.seed_policy.label.clone(),
            config: config.clone(),
            scenario: None,
            trace_file: None,
            summary_file: None,
        })
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), ChmError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                ChmError::Serde(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, ChmError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Hex-encoded SHA-256 of the JSON form of `config`.
pub fn config_hash(config: &RunConfig) -> Result<String, ChmError> {
    let bytes = serde_json::to_vec(config)
        .map_err(|err| ChmError::Serde(ErrorInfo::new("config-serialize", err.to_string())))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
