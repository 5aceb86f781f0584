/// Target acceptance rate for single-parameter scaling moves.
pub const SCALE_TARGET: f64 = 0.44;
/// Target acceptance rate for multi-parameter and simplex moves.
pub const MULTI_TARGET: f64 = 0.234;

/// Adjusts a proposal step from its recent acceptance rate.
///
/// Above target the step grows by `1 + (rate - target) / (1 - target)`,
/// otherwise it shrinks by `2 - rate / target`.
pub fn tune_step(step: f64, rate: f64, target: f64) -> f64 {
    if rate > target {
        step * (1.0 + (rate - target) / (1.0 - target))
    } else {
        step / (2.0 - rate / target)
    }
}
