use chm_core::ChmError;

use super::{config_error, ModifyRate, NodeContext};
use crate::event::CharacterEvent;

/// Rewards events that match the state of nearby sites.
///
/// For a candidate at site `s`, counts the sites in `s - width ..= s + width`
/// (excluding `s`) that already hold the candidate state and returns
/// `1 + factor * count`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyWindow {
    width: usize,
    factor: f64,
}

impl AdjacencyWindow {
    /// Creates a window modifier; `factor` must be finite and non-negative.
    pub fn new(width: usize, factor: f64) -> Result<Self, ChmError> {
        check_factor(factor)?;
        Ok(Self { width, factor })
    }

    /// Current factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Replaces the factor.
    pub fn set_factor(&mut self, factor: f64) -> Result<(), ChmError> {
        check_factor(factor)?;
        self.factor = factor;
        Ok(())
    }

    fn matching_neighbours(&self, current: &[usize], event: &CharacterEvent) -> usize {
        if current.is_empty() {
            return 0;
        }
        let lo = event.site.saturating_sub(self.width);
        let hi = (event.site + self.width).min(current.len() - 1);
        (lo..=hi)
            .filter(|&site| site != event.site && current[site] == event.state)
            .count()
    }
}

fn check_factor(factor: f64) -> Result<(), ChmError> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(config_error(
            "adjacency-factor",
            "adjacency factor must be finite and non-negative",
        ));
    }
    Ok(())
}

impl ModifyRate for AdjacencyWindow {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        _age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        1.0 + self.factor * self.matching_neighbours(current, event) as f64
    }

    fn name(&self) -> &'static str {
        "adjacency-window"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_neighbours_in_window() {
        let modifier = AdjacencyWindow::new(1, 0.5).unwrap();
        let current = [1, 0, 1, 1, 0];
        // site 1 gaining state 1: neighbours 0 and 2 both hold 1
        let event = CharacterEvent::new(1, 1, 0.5);
        assert_eq!(modifier.compute_multiplier(&current, &event, 0.0, None), 2.0);
        // site 4 gaining state 1: only neighbour 3 is in the window
        let event = CharacterEvent::new(4, 1, 0.5);
        assert_eq!(modifier.compute_multiplier(&current, &event, 0.0, None), 1.5);
    }

    #[test]
    fn rejects_negative_factor() {
        assert!(AdjacencyWindow::new(2, -0.1).is_err());
    }
}
