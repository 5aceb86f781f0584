use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::Tree;
use serde::{Deserialize, Serialize};

use super::{
    AdjacencyWindow, ClassTable, Coordinate, DistanceMetric, EpochGeography, PhyloDistance,
    RangeContext, RateModifier, StateCount,
};

/// Serializable description of a rate modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModifierConfig {
    /// See [`AdjacencyWindow`].
    AdjacencyWindow {
        /// Half-width of the window in sites.
        width: usize,
        /// Weight per matching neighbour.
        factor: f64,
    },
    /// See [`PhyloDistance`], with an explicit distance matrix.
    PhyloDistance {
        /// Square site-by-site distance matrix.
        distances: Vec<Vec<f64>>,
        /// Exponential decay scale.
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// See [`PhyloDistance`], with distances taken from a host tree.
    HostSwitch {
        /// Parent indices of the host tree (`-1` for the root).
        host_parents: Vec<i64>,
        /// Branch lengths of the host tree.
        host_branch_lengths: Vec<f64>,
        /// Exponential decay scale.
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// See [`RangeContext`].
    RangeContext {
        /// `[source, target, weight]` triples.
        edges: Vec<(usize, usize, f64)>,
    },
    /// See [`ClassTable`].
    ClassTable {
        /// Class index of every site.
        site_classes: Vec<usize>,
        /// Event class of every `(from, to)` pair.
        event_classes: Vec<Vec<usize>>,
        /// Multipliers indexed by site class then event class.
        table: Vec<Vec<f64>>,
    },
    /// See [`StateCount`].
    StateCount {
        /// Base of the power law.
        factor: f64,
    },
    /// See [`EpochGeography`].
    EpochGeography {
        /// Epochs listed oldest first.
        epochs: Vec<EpochConfig>,
        /// Restrict dispersal to adjacent areas.
        #[serde(default)]
        use_adjacency: bool,
        /// Optional area coordinates enabling distance dependence.
        #[serde(default)]
        coordinates: Option<Vec<Coordinate>>,
        /// Distance metric for coordinates.
        #[serde(default)]
        metric: DistanceMetric,
        /// Exponent applied to distances (`d^-power`).
        #[serde(default)]
        distance_power: f64,
    },
}

/// One epoch of a time-stratified atlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Age at which the epoch ends (its younger boundary).
    pub end_age: f64,
    /// Area-by-area dispersal weights; the diagonal marks availability.
    pub dispersal: Vec<Vec<f64>>,
}

fn default_scale() -> f64 {
    1.0
}

impl ModifierConfig {
    /// Validates the description against the character dimensions and
    /// builds the modifier.
    pub fn build(
        &self,
        num_sites: usize,
        num_states: usize,
        forbid_extinction: bool,
    ) -> Result<RateModifier, ChmError> {
        let modifier: RateModifier = match self {
            ModifierConfig::AdjacencyWindow { width, factor } => {
                AdjacencyWindow::new(*width, *factor)?.into()
            }
            ModifierConfig::PhyloDistance { distances, scale } => {
                let modifier = PhyloDistance::new(distances.clone(), *scale)?;
                check_sites("phylo-distance", modifier.num_sites(), num_sites)?;
                modifier.into()
            }
            ModifierConfig::HostSwitch {
                host_parents,
                host_branch_lengths,
                scale,
            } => {
                let host_tree = Tree::from_parent_indices(host_parents, host_branch_lengths)?;
                let modifier = PhyloDistance::from_host_tree(&host_tree, *scale)?;
                check_sites("host-switch", modifier.num_sites(), num_sites)?;
                modifier.into()
            }
            ModifierConfig::RangeContext { edges } => {
                RangeContext::new(num_sites, edges, forbid_extinction)?.into()
            }
            ModifierConfig::ClassTable {
                site_classes,
                event_classes,
                table,
            } => {
                check_sites("class-table", site_classes.len(), num_sites)?;
                if event_classes.len() != num_states {
                    return Err(ChmError::Config(
                        ErrorInfo::new("event-class-states", "event class matrix must cover every state")
                            .with_context("expected", num_states.to_string())
                            .with_context("found", event_classes.len().to_string()),
                    ));
                }
                ClassTable::new(site_classes.clone(), event_classes.clone(), table.clone())?.into()
            }
            ModifierConfig::StateCount { factor } => StateCount::new(*factor)?.into(),
            ModifierConfig::EpochGeography {
                epochs,
                use_adjacency,
                coordinates,
                metric,
                distance_power,
            } => {
                let modifier = EpochGeography::new(
                    epochs.iter().map(|epoch| epoch.end_age).collect(),
                    epochs.iter().map(|epoch| epoch.dispersal.clone()).collect(),
                    *use_adjacency,
                    coordinates.clone(),
                    *metric,
                    *distance_power,
                )?;
                check_sites("epoch-geography", modifier.num_areas(), num_sites)?;
                modifier.into()
            }
        };
        Ok(modifier)
    }
}

fn check_sites(kind: &str, found: usize, expected: usize) -> Result<(), ChmError> {
    if found != expected {
        return Err(ChmError::Config(
            ErrorInfo::new("modifier-site-count", "modifier does not cover every site")
                .with_context("modifier", kind)
                .with_context("expected", expected.to_string())
                .with_context("found", found.to_string()),
        ));
    }
    Ok(())
}
