//! Sampling primitives on top of an explicit generator.
//!
//! Every stochastic step of the engines goes through these helpers so
//! that the sequence of draws, and therefore the generated network, is
//! a function of the seed alone.

use rand::Rng;

/// Samples `U[0, 1)`.
#[inline]
pub fn sample_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>()
}

/// Samples `Exp(lambda)`.
///
/// Uses `1 - U[0, 1)` so the logarithm never sees zero.
pub fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> f64 {
    debug_assert!(lambda > 0.0, "lambda > 0.0");
    -libm::log(1.0 - sample_uniform(rng)) / lambda
}

/// Samples an index with probability proportional to `weights`.
///
/// Returns `None` if no weight is positive.
pub fn sample_weighted<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if !(total > 0.0) {
        return None;
    }
    Some(select_weighted(weights, sample_uniform(rng) * total))
}

/// Walks the cumulative sum of `weights` and returns the slot `target`
/// falls into.
///
/// Rounding can push `target` past the last cumulative value, so the
/// last positive slot is the fallback.
pub(crate) fn select_weighted(weights: &[f64], target: f64) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            cumulative += w;
            last_positive = i;
            if target < cumulative {
                return i;
            }
        }
    }
    last_positive
}
