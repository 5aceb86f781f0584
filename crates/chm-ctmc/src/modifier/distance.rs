use chm_core::errors::{ChmError, ErrorInfo};
use chm_core::Tree;

use super::{config_error, ModifyRate, NodeContext};
use crate::event::CharacterEvent;
use crate::OFF_STATE;

/// Gain rates decay with distance to the sites that are currently occupied.
///
/// A gain at site `j` is multiplied by `sum_i exp(-scale * d(i, j))` over the
/// occupied sites `i != j`; losses are left unchanged. Distances are either
/// supplied directly or taken as patristic distances between the tips of a
/// host tree (site `k` is the `k`-th tip in index order).
#[derive(Debug, Clone, PartialEq)]
pub struct PhyloDistance {
    distances: Vec<Vec<f64>>,
    scale: f64,
    weights: Vec<Vec<f64>>,
}

impl PhyloDistance {
    /// Builds the modifier from an explicit square distance matrix.
    pub fn new(distances: Vec<Vec<f64>>, scale: f64) -> Result<Self, ChmError> {
        let n = distances.len();
        for (row_idx, row) in distances.iter().enumerate() {
            if row.len() != n {
                return Err(ChmError::Config(
                    ErrorInfo::new("distance-matrix-shape", "distance matrix must be square")
                        .with_context("row", row_idx.to_string())
                        .with_context("expected", n.to_string())
                        .with_context("found", row.len().to_string()),
                ));
            }
            if row.iter().any(|d| !d.is_finite() || *d < 0.0) {
                return Err(config_error(
                    "distance-matrix-value",
                    "distances must be finite and non-negative",
                ));
            }
        }
        check_scale(scale)?;
        let mut modifier = Self {
            distances,
            scale,
            weights: Vec::new(),
        };
        modifier.update();
        Ok(modifier)
    }

    /// Builds the host-switch form from the tips of `host_tree`.
    pub fn from_host_tree(host_tree: &Tree, scale: f64) -> Result<Self, ChmError> {
        let tips = host_tree.tips();
        Self::new(host_tree.patristic_matrix(&tips), scale)
    }

    /// Number of sites covered by the distance matrix.
    pub fn num_sites(&self) -> usize {
        self.distances.len()
    }

    /// Current decay scale.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Replaces the decay scale and refreshes the weight cache.
    pub fn set_scale(&mut self, scale: f64) -> Result<(), ChmError> {
        check_scale(scale)?;
        if scale != self.scale {
            self.scale = scale;
            self.update();
        }
        Ok(())
    }
}

fn check_scale(scale: f64) -> Result<(), ChmError> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(config_error(
            "distance-scale",
            "distance scale must be finite and non-negative",
        ));
    }
    Ok(())
}

impl ModifyRate for PhyloDistance {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        _age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        if event.state == OFF_STATE {
            return 1.0;
        }
        current
            .iter()
            .enumerate()
            .filter(|&(site, &state)| site != event.site && state != OFF_STATE)
            .map(|(site, _)| self.weights[site][event.site])
            .sum()
    }

    fn update(&mut self) {
        let scale = self.scale;
        self.weights = self
            .distances
            .iter()
            .map(|row| row.iter().map(|d| (-scale * d).exp()).collect())
            .collect();
    }

    fn name(&self) -> &'static str {
        "phylo-distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_sums_decayed_weights() {
        let distances = vec![
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, 1.0],
            vec![2.0, 1.0, 0.0],
        ];
        let modifier = PhyloDistance::new(distances, 1.0).unwrap();
        let event = CharacterEvent::new(2, 1, 0.5);
        let value = modifier.compute_multiplier(&[1, 1, 0], &event, 0.0, None);
        let expected = (-2.0f64).exp() + (-1.0f64).exp();
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn loss_is_unmodified() {
        let modifier = PhyloDistance::new(vec![vec![0.0, 3.0], vec![3.0, 0.0]], 2.0).unwrap();
        let event = CharacterEvent::new(0, 0, 0.5);
        assert_eq!(modifier.compute_multiplier(&[1, 1], &event, 0.0, None), 1.0);
    }

    #[test]
    fn set_scale_refreshes_cache() {
        let mut modifier =
            PhyloDistance::new(vec![vec![0.0, 1.0], vec![1.0, 0.0]], 0.0).unwrap();
        let event = CharacterEvent::new(1, 1, 0.5);
        assert_eq!(modifier.compute_multiplier(&[1, 0], &event, 0.0, None), 1.0);
        modifier.set_scale(1.0).unwrap();
        let value = modifier.compute_multiplier(&[1, 0], &event, 0.0, None);
        assert!((value - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn host_tree_distances_follow_tips() {
        let host = Tree::from_parent_indices(&[2, 2, -1], &[1.0, 3.0, 0.0]).unwrap();
        let modifier = PhyloDistance::from_host_tree(&host, 0.5).unwrap();
        assert_eq!(modifier.num_sites(), 2);
        let event = CharacterEvent::new(1, 1, 0.5);
        let value = modifier.compute_multiplier(&[1, 0], &event, 0.0, None);
        assert!((value - (-2.0f64).exp()).abs() < 1e-12);
    }
}
