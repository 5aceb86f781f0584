use std::path::Path;
use std::sync::{Arc, Mutex};

use chm_core::errors::{ChmError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::chain::{Model, Monitor};

/// One recorded generation of the active chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    /// Generation index (0 is the initial state).
    pub generation: usize,
    /// Index of the chain that was active.
    pub chain: usize,
    /// Heat of that chain.
    pub heat: f64,
    /// Unheated log posterior.
    pub ln_posterior: f64,
    /// Model-specific summaries in a fixed order.
    pub values: Vec<(String, f64)>,
}

/// Collects trace rows in generation order.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    rows: Vec<TraceRow>,
}

/// Recorder shared by the monitors of every chain.
pub type SharedTrace = Arc<Mutex<TraceRecorder>>;

impl TraceRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty recorder behind a shared handle.
    pub fn shared() -> SharedTrace {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Appends a row.
    pub fn push(&mut self, row: TraceRow) {
        self.rows.push(row);
    }

    /// Recorded rows.
    pub fn rows(&self) -> &[TraceRow] {
        &self.rows
    }

    /// Mean log posterior over the recorded rows.
    pub fn mean_ln_posterior(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let sum: f64 = self.rows.iter().map(|row| row.ln_posterior).sum();
        Some(sum / self.rows.len() as f64)
    }

    /// Writes the rows as CSV with one column per model summary.
    pub fn write_csv(&self, path: &Path) -> Result<(), ChmError> {
        let csv_error = |err: csv::Error| {
            ChmError::Serde(
                ErrorInfo::new("trace-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        let mut header = vec![
            "generation".to_string(),
            "chain".to_string(),
            "heat".to_string(),
            "ln_posterior".to_string(),
        ];
        if let Some(first) = self.rows.first() {
            header.extend(first.values.iter().map(|(name, _)| name.clone()));
        }
        writer.write_record(&header).map_err(csv_error)?;
        for row in &self.rows {
            let mut record = vec![
                row.generation.to_string(),
                row.chain.to_string(),
                format!("{:.6}", row.heat),
                format!("{:.6}", row.ln_posterior),
            ];
            record.extend(row.values.iter().map(|(_, value)| format!("{value:.6}")));
            writer.write_record(&record).map_err(csv_error)?;
        }
        writer.flush().map_err(|err| {
            ChmError::Serde(
                ErrorInfo::new("trace-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Monitor recording the active chain into a shared [`TraceRecorder`]
/// every `thinning` generations.
#[derive(Debug, Clone)]
pub struct TraceMonitor {
    recorder: SharedTrace,
    chain: usize,
    thinning: usize,
}

impl TraceMonitor {
    /// Creates the monitor of chain `chain`.
    pub fn new(recorder: SharedTrace, chain: usize, thinning: usize) -> Self {
        Self {
            recorder,
            chain,
            thinning: thinning.max(1),
        }
    }
}

impl<M: Model> Monitor<M> for TraceMonitor {
    fn on_generation(&mut self, generation: usize, model: &M, heat: f64) -> Result<(), ChmError> {
        if generation % self.thinning != 0 {
            return Ok(());
        }
        let row = TraceRow {
            generation,
            chain: self.chain,
            heat,
            ln_posterior: model.ln_posterior(),
            values: model
                .trace_values()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        };
        let mut recorder = self.recorder.lock().map_err(|_| {
            ChmError::Model(ErrorInfo::new("trace-lock", "trace recorder lock poisoned"))
        })?;
        recorder.push(row);
        Ok(())
    }
}
