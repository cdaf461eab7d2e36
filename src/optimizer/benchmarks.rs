//! Synthetic objective functions for exercising the optimizers.
//!
//! All of these take raw-space vectors directly and satisfy the blanket
//! closure [`Evaluator`](crate::evaluate::Evaluator) impl, so they can be
//! passed straight to [`GlobalOptimizer::optimize`](super::GlobalOptimizer::optimize).

use std::f64::consts::PI;

/// Sum of squares; global minimum 0 at the origin.
#[must_use]
pub fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

/// Sum of squared distances to `target`; global minimum 0 at `target`.
///
/// Used as a recovery objective: the optimizer must reproduce every axis of
/// a known hidden vector.
pub fn offset_sphere(target: Vec<f64>) -> impl Fn(&[f64]) -> f64 {
    move |x: &[f64]| {
        x.iter()
            .zip(target.iter())
            .map(|(v, t)| (v - t) * (v - t))
            .sum()
    }
}

/// Multimodal sinusoid-plus-quadratic bowl, defined for any dimensionality.
///
/// Axis `k` contributes
/// `amp_k * sin(freq_k * x + phase_k) + weight_k * (x - center_k)^2` with
/// amplitudes, frequencies and centers that differ per axis, giving many
/// local minima of nearly equal depth inside a shallow global bowl. Greedy
/// local descent parks in the nearest trough; finding the deep ones requires
/// actual basin hopping.
#[must_use]
pub fn sinusoidal_bowl(x: &[f64]) -> f64 {
    x.iter()
        .enumerate()
        .map(|(k, &v)| {
            let kf = k as f64;
            let amp = 1.5 - 0.1 * kf;
            let freq = (4.0 - kf) * PI;
            let phase = 0.3 + 0.1 * kf;
            let center = if k % 2 == 0 { 1.0 } else { -1.0 } * (0.7 + 0.1 * kf);
            let weight = 0.1 * (kf + 1.0);
            amp * (freq * v + phase).sin() + weight * (v - center) * (v - center)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_minimum_at_origin() {
        assert_eq!(sphere(&[0.0, 0.0, 0.0]), 0.0);
        assert!((sphere(&[3.0, 4.0]) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_sphere_minimum_at_target() {
        let f = offset_sphere(vec![1.0, -2.0, 0.5]);
        assert_eq!(f(&[1.0, -2.0, 0.5]), 0.0);
        assert!(f(&[0.0, 0.0, 0.0]) > 0.0);
    }

    #[test]
    fn test_sinusoidal_bowl_is_multimodal() {
        // Two nearby troughs of the first axis differ by roughly the
        // quadratic term only, so both are genuine local minima.
        let a = sinusoidal_bowl(&[0.3]);
        let b = sinusoidal_bowl(&[0.8]);
        let ridge = sinusoidal_bowl(&[0.55]);
        assert!(ridge > a && ridge > b, "no ridge between troughs");
    }

    #[test]
    fn test_sinusoidal_bowl_lower_bound() {
        // Three axes with amplitudes 1.5, 1.4, 1.3: total can never drop
        // below the sum of the pure sinusoid minima.
        for point in [[0.0, 0.0, 0.0], [0.7, -0.8, 0.9], [-1.0, 1.0, -1.0]] {
            assert!(sinusoidal_bowl(&point) >= -4.2);
        }
    }
}
