use chm_core::errors::{ChmError, ErrorInfo};

use super::{ModifyRate, NodeContext};
use crate::event::CharacterEvent;
use crate::history::count_occupied;
use crate::OFF_STATE;

/// Gain rates driven by a sparse weighted adjacency between sites.
///
/// A gain at site `j` is multiplied by the summed weight of the edges
/// `i -> j` whose source `i` is occupied. Losses are unchanged unless they
/// would empty the range while extinction is forbidden, in which case they
/// are impossible.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeContext {
    incoming: Vec<Vec<(usize, f64)>>,
    forbid_extinction: bool,
}

impl RangeContext {
    /// Builds the modifier from `(source, target, weight)` triples.
    pub fn new(
        num_sites: usize,
        edges: &[(usize, usize, f64)],
        forbid_extinction: bool,
    ) -> Result<Self, ChmError> {
        let mut incoming = vec![Vec::new(); num_sites];
        for &(source, target, weight) in edges {
            if source >= num_sites || target >= num_sites {
                return Err(ChmError::Config(
                    ErrorInfo::new("range-edge-site", "edge endpoint exceeds site count")
                        .with_context("source", source.to_string())
                        .with_context("target", target.to_string())
                        .with_context("num_sites", num_sites.to_string()),
                ));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(ChmError::Config(
                    ErrorInfo::new("range-edge-weight", "edge weights must be finite and non-negative")
                        .with_context("source", source.to_string())
                        .with_context("target", target.to_string()),
                ));
            }
            incoming[target].push((source, weight));
        }
        Ok(Self {
            incoming,
            forbid_extinction,
        })
    }
}

impl ModifyRate for RangeContext {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        _age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        if event.state == OFF_STATE {
            let last_present =
                current[event.site] != OFF_STATE && count_occupied(current) == 1;
            return if self.forbid_extinction && last_present {
                0.0
            } else {
                1.0
            };
        }
        self.incoming[event.site]
            .iter()
            .filter(|(source, _)| current[*source] != OFF_STATE)
            .map(|(_, weight)| weight)
            .sum()
    }

    fn name(&self) -> &'static str {
        "range-context"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_sums_present_sources() {
        let modifier =
            RangeContext::new(3, &[(0, 2, 0.5), (1, 2, 2.0), (2, 0, 1.0)], false).unwrap();
        let event = CharacterEvent::new(2, 1, 0.3);
        assert_eq!(modifier.compute_multiplier(&[1, 0, 0], &event, 0.0, None), 0.5);
        assert_eq!(modifier.compute_multiplier(&[1, 1, 0], &event, 0.0, None), 2.5);
    }

    #[test]
    fn last_loss_forbidden() {
        let modifier = RangeContext::new(2, &[], true).unwrap();
        let event = CharacterEvent::new(0, 0, 0.3);
        assert_eq!(modifier.compute_multiplier(&[1, 0], &event, 0.0, None), 0.0);
        assert_eq!(modifier.compute_multiplier(&[1, 1], &event, 0.0, None), 1.0);
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(RangeContext::new(2, &[(0, 5, 1.0)], false).is_err());
        assert!(RangeContext::new(2, &[(0, 1, -1.0)], false).is_err());
    }
}
