//! The evaluator contract between the optimization engine and the domain
//! layer.
//!
//! The domain side (light-curve renderers, neural opacity fields) implements
//! [`Evaluator`]; the engine only ever sees a scalar error plus the resolved
//! raw vector the evaluator actually used. Plain closures over `&[f64]` are
//! evaluators too, which keeps test objectives and quick experiments terse.
//!
//! NaN errors are data, not faults: an occulting-shape model can be undefined
//! outside the shape's support, and such candidates rank strictly worse than
//! any finite candidate without aborting the run.

use crate::error::Result;

/// The result of scoring one raw vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Scalar fitness error (lower is better; NaN marks an undefined model).
    pub error: f64,
    /// The raw vector actually used; evaluators may clamp or otherwise
    /// resolve the input internally.
    pub resolved: Vec<f64>,
    /// Additive penalty term, typically a [`crate::codec::ParameterCodec::extra_error`]
    /// out-of-range penalty. Explicit here, never hidden global state.
    pub extra_error: f64,
}

impl Evaluation {
    /// Creates an evaluation with no penalty term.
    #[must_use]
    pub fn new(error: f64, resolved: Vec<f64>) -> Self {
        Self {
            error,
            resolved,
            extra_error: 0.0,
        }
    }

    /// Attaches an additive penalty term.
    #[must_use]
    pub fn with_extra_error(mut self, extra_error: f64) -> Self {
        self.extra_error = extra_error;
        self
    }

    /// Fitness plus penalty; what optimizers actually rank by.
    #[must_use]
    pub fn total_error(&self) -> f64 {
        self.error + self.extra_error
    }
}

/// Caller-supplied scoring capability.
///
/// `Sync` so one generation's candidates can be scored in parallel; no other
/// requirement is placed on the domain layer.
pub trait Evaluator: Sync {
    /// Scores a raw vector.
    ///
    /// # Errors
    ///
    /// A domain failure here aborts the whole optimization run; it is never
    /// retried or suppressed. Return a NaN error value instead for points
    /// where the model is merely undefined.
    fn evaluate(&self, raw: &[f64]) -> Result<Evaluation>;

    /// Optional per-axis perturbation scales for fine local refinement,
    /// used by variants with a consolidation phase.
    fn recommend_epsilon(&self, raw: &[f64]) -> Option<Vec<f64>> {
        let _ = raw;
        None
    }
}

impl<F> Evaluator for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn evaluate(&self, raw: &[f64]) -> Result<Evaluation> {
        Ok(Evaluation::new(self(raw), raw.to_vec()))
    }
}

/// A raw-space position with its cached total error.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Resolved position in raw space.
    pub position: Vec<f64>,
    /// Cached total error (fitness plus penalty).
    pub error: f64,
}

impl Candidate {
    /// Builds a candidate from a finished evaluation.
    #[must_use]
    pub fn from_evaluation(evaluation: Evaluation) -> Self {
        Self {
            error: evaluation.total_error(),
            position: evaluation.resolved,
        }
    }

    /// Whether the cached error is finite (usable for direction-forming).
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.error.is_finite()
    }

    /// NaN-aware strict ordering: true when `self` is strictly better.
    #[must_use]
    pub fn beats(&self, other: &Candidate) -> bool {
        beats(self.error, other.error)
    }
}

/// NaN-aware strict "lower error wins" comparison. A NaN error is strictly
/// worse than any finite error; two NaNs tie.
#[must_use]
pub fn beats(a: f64, b: f64) -> bool {
    a < b || (b.is_nan() && !a.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_error_sums_penalty() {
        let eval = Evaluation::new(2.0, vec![0.0]).with_extra_error(0.5);
        assert!((eval.total_error() - 2.5).abs() < 1e-15);
    }

    #[test]
    fn test_closure_is_an_evaluator() {
        let sphere = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
        let eval = sphere.evaluate(&[3.0, 4.0]).unwrap();
        assert!((eval.error - 25.0).abs() < 1e-12);
        assert_eq!(eval.resolved, vec![3.0, 4.0]);
        assert_eq!(eval.extra_error, 0.0);
        assert!(sphere.recommend_epsilon(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_beats_ordering() {
        assert!(beats(1.0, 2.0));
        assert!(!beats(2.0, 1.0));
        assert!(!beats(1.0, 1.0));
        // NaN loses to anything finite and ties with NaN.
        assert!(beats(1.0, f64::NAN));
        assert!(!beats(f64::NAN, 1.0));
        assert!(!beats(f64::NAN, f64::NAN));
        // Infinity is still better than NaN but worse than finite.
        assert!(beats(f64::INFINITY, f64::NAN));
        assert!(beats(1.0, f64::INFINITY));
    }

    #[test]
    fn test_candidate_from_nan_evaluation() {
        let cand = Candidate::from_evaluation(Evaluation::new(f64::NAN, vec![1.0]));
        assert!(!cand.is_finite());
        let finite = Candidate::from_evaluation(Evaluation::new(1e9, vec![0.0]));
        assert!(finite.beats(&cand));
        assert!(!cand.beats(&finite));
    }
}
