//! Logistic transform between log-odds and probability.

/// Smallest probability `sigmoid` returns.
pub const MIN_PROBABILITY: f64 = f64::MIN_POSITIVE;

/// Largest probability `sigmoid` returns (the f64 just below 1.0).
pub const MAX_PROBABILITY: f64 = 1.0 - f64::EPSILON / 2.0;

/// Map a log-odds score to a probability in the open interval (0, 1).
///
/// `exp` is only ever evaluated on a non-positive argument, so very large
/// magnitudes saturate instead of overflowing. Saturated results are clamped
/// so the bounds stay strict.
pub fn sigmoid(x: f64) -> f64 {
    let p = if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    };
    p.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
}

/// Inverse of [`sigmoid`]. Probabilities at or beyond the bounds are clamped first.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(MIN_PROBABILITY, MAX_PROBABILITY);
    (p / (1.0 - p)).ln()
}
