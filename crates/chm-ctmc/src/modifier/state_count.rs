use chm_core::ChmError;

use super::{config_error, ModifyRate, NodeContext};
use crate::event::CharacterEvent;

/// Power law in the number of sites already holding the target state.
///
/// Returns `factor^(n - 1)` where `n` counts the sites in the candidate's
/// target state. A factor of exactly 1 is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct StateCount {
    factor: f64,
}

impl StateCount {
    /// Creates the modifier; `factor` must be finite and strictly positive.
    pub fn new(factor: f64) -> Result<Self, ChmError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(config_error(
                "state-count-factor",
                "state count factor must be finite and positive",
            ));
        }
        Ok(Self { factor })
    }

    /// Current factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl ModifyRate for StateCount {
    fn compute_multiplier(
        &self,
        current: &[usize],
        event: &CharacterEvent,
        _age: f64,
        _node: Option<&NodeContext>,
    ) -> f64 {
        if self.factor == 1.0 {
            return 1.0;
        }
        let n = current.iter().filter(|&&state| state == event.state).count() as i32;
        self.factor.powi(n - 1)
    }

    fn name(&self) -> &'static str {
        "state-count"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_factor_is_identity() {
        let modifier = StateCount::new(1.0).unwrap();
        let event = CharacterEvent::new(0, 1, 0.1);
        assert_eq!(modifier.compute_multiplier(&[0, 1, 1, 1], &event, 3.0, None), 1.0);
    }

    #[test]
    fn scales_with_count() {
        let modifier = StateCount::new(2.0).unwrap();
        let event = CharacterEvent::new(0, 1, 0.1);
        assert_eq!(modifier.compute_multiplier(&[0, 1, 1, 1], &event, 0.0, None), 4.0);
        assert_eq!(modifier.compute_multiplier(&[0, 0, 0, 0], &event, 0.0, None), 0.5);
    }
}
