/// Transition probabilities of a two-state chain over a fixed time.
///
/// With rate `r0` into state 0 and `r1` into state 1, the stationary share of
/// state 0 is `p = r0 / (r0 + r1)` and every entry relaxes towards it at rate
/// `r0 + r1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoStateTransition {
    probs: [[f64; 2]; 2],
}

impl TwoStateTransition {
    /// Builds the matrix for rates `to_off` (into 0), `to_on` (into 1) and
    /// time `scaled_time` already multiplied by any branch scalars.
    pub fn new(to_off: f64, to_on: f64, scaled_time: f64) -> Self {
        let total = to_off + to_on;
        if !(total > 0.0) || !total.is_finite() {
            return Self {
                probs: [[1.0, 0.0], [0.0, 1.0]],
            };
        }
        let p = to_off / total;
        let q = 1.0 - p;
        let decay = (-total * scaled_time).exp();
        Self {
            probs: [
                [p + q * decay, q - q * decay],
                [p - p * decay, q + p * decay],
            ],
        }
    }

    /// `P(to | from)`.
    pub fn probability(&self, from: usize, to: usize) -> f64 {
        self.probs[from][to]
    }

    /// Row of probabilities leaving `from`.
    pub fn row(&self, from: usize) -> [f64; 2] {
        self.probs[from]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sum_to_one() {
        let matrix = TwoStateTransition::new(0.3, 1.2, 0.8);
        for from in 0..2 {
            let row = matrix.row(from);
            assert!((row[0] + row[1] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_time_is_identity() {
        let matrix = TwoStateTransition::new(0.3, 1.2, 0.0);
        assert!((matrix.probability(0, 0) - 1.0).abs() < 1e-12);
        assert!(matrix.probability(1, 0).abs() < 1e-12);
    }

    #[test]
    fn long_time_reaches_stationary_share() {
        let matrix = TwoStateTransition::new(1.0, 3.0, 1000.0);
        assert!((matrix.probability(0, 0) - 0.25).abs() < 1e-12);
        assert!((matrix.probability(1, 0) - 0.25).abs() < 1e-12);
    }
}
