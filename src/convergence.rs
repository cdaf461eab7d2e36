//! Plateau detection by gradient reduction.
//!
//! Flags a search plateau when the smoothed recent rate of improvement is
//! small relative to the cumulative improvement rate since the run began.
//! Gradients here are value deltas over Euclidean point distance, so the
//! check is scale-aware without knowing anything about the landscape.

use serde::{Deserialize, Serialize};

use crate::cluster::euclidean_distance;

/// A position in raw space paired with its error value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    /// Position in raw space.
    pub point: Vec<f64>,
    /// Error value at that position.
    pub value: f64,
}

impl PointValue {
    /// Creates a point-value pair.
    #[must_use]
    pub fn new(point: Vec<f64>, value: f64) -> Self {
        Self { point, value }
    }
}

/// Gradient-reduction convergence checker.
///
/// Keeps a running-average gradient of step-to-step progress and compares it
/// to the total gradient since the reference (first) point. Converged once
/// `|running / total| <= tau`.
///
/// State is mutated only by [`GradientReduction::converged`] across
/// successive calls within one optimization run; call
/// [`GradientReduction::reset`] to reuse the checker for another run.
///
/// # Examples
///
/// ```
/// use umbrafit::convergence::{GradientReduction, PointValue};
///
/// let mut checker = GradientReduction::default();
/// let a = PointValue::new(vec![0.0], 10.0);
/// let b = PointValue::new(vec![1.0], 5.0);
/// // First call only records the reference.
/// assert!(!checker.converged(0, None, &a));
/// assert!(!checker.converged(1, Some(&a), &b));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientReduction {
    /// Smoothing coefficient for the running-average gradient.
    alpha: f64,
    /// Convergence threshold on the gradient ratio.
    tau: f64,
    #[serde(skip)]
    running: Option<f64>,
    #[serde(skip)]
    reference: Option<PointValue>,
}

impl Default for GradientReduction {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            tau: 0.003,
            running: None,
            reference: None,
        }
    }
}

impl GradientReduction {
    /// Creates a checker with the default smoothing (0.1) and threshold
    /// (0.003).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the smoothing coefficient.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the ratio threshold.
    #[must_use]
    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    /// Clears run-local state so the checker can serve another run.
    pub fn reset(&mut self) {
        self.running = None;
        self.reference = None;
    }

    /// Current running-average gradient, if one has been seeded.
    #[must_use]
    pub fn running_gradient(&self) -> Option<f64> {
        self.running
    }

    /// Feeds one step of progress and reports whether the search has
    /// plateaued.
    ///
    /// The first call (or any call with `iteration == 0`) records `new` as
    /// the reference point, optionally seeds the running gradient from
    /// `old -> new` (a zero distance seeds it with 0), and reports
    /// not-converged. Later calls blend the instantaneous gradient into the
    /// running average (a zero-distance step is skipped, leaving the average
    /// unchanged) and compare it against the total gradient from the
    /// reference.
    pub fn converged(&mut self, iteration: usize, old: Option<&PointValue>, new: &PointValue) -> bool {
        if iteration == 0 || self.reference.is_none() {
            self.reference = Some(new.clone());
            if let Some(old) = old {
                let d = euclidean_distance(&old.point, &new.point);
                self.running = Some(if d > 0.0 { (new.value - old.value) / d } else { 0.0 });
            }
            return false;
        }

        if let Some(old) = old {
            let d = euclidean_distance(&old.point, &new.point);
            if d > 0.0 {
                let instant = (new.value - old.value) / d;
                self.running = Some(match self.running {
                    Some(g) => self.alpha * instant + (1.0 - self.alpha) * g,
                    None => instant,
                });
            }
        }

        let Some(reference) = self.reference.as_ref() else {
            return false;
        };
        let total_distance = euclidean_distance(&reference.point, &new.point);
        if total_distance == 0.0 {
            return false;
        }
        let total = (new.value - reference.value) / total_distance;

        match self.running {
            Some(g) if total != 0.0 => (g / total).abs() <= self.tau,
            _ => false,
        }
    }
}
