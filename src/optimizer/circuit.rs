//! Ring ("circuit") perturbation optimizer.
//!
//! The population sits on a logical ring. Every generation each candidate
//! takes an adaptively scaled Gaussian step and drifts toward the better of
//! its two ring neighbors; acceptance is greedy per candidate. When the
//! global best stalls, every step scale is multiplied by the expansion
//! factor to punch out of the current basin. Clustering passes regroup the
//! ring so neighborhoods stay spatially coherent, and `circuit_shuffliness`
//! randomizes the ring between passes to keep information flowing around
//! the circuit.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    best_index, best_movement, check_dimension, cluster_attractors, default_cluster_count,
    evaluate_batch, partition_population, sample_initial, standard_normal, DisplacementTracker,
    GlobalOptimizer, OptimizationOutcome, Phase, Progress, TerminationReason,
};
use crate::convergence::{GradientReduction, PointValue};
use crate::error::{Result, UmbrafitError};
use crate::evaluate::Evaluator;

const SCALE_GROW: f64 = 1.15;
const SCALE_SHRINK: f64 = 0.85;
const SCALE_MAX: f64 = 10.0;
const SCALE_MIN: f64 = 1e-12;
const STALL_LIMIT: usize = 15;

/// Ring-topology perturbation optimizer.
///
/// # Example
///
/// ```
/// use umbrafit::optimizer::{CircuitOptimizer, GlobalOptimizer};
///
/// let sphere = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
/// let opt = CircuitOptimizer::new(20).with_seed(42);
/// let outcome = opt.optimize(3, &sphere).unwrap();
/// assert!(outcome.error < 0.1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitOptimizer {
    /// Number of candidates on the ring.
    pub population_size: usize,
    /// Base Gaussian step size, in raw-space units.
    pub displacement_factor: f64,
    /// Step-scale multiplier applied when the global best stalls.
    pub expansion_factor: f64,
    /// Per-generation probability of reshuffling the ring order.
    pub circuit_shuffliness: f64,
    /// Internal iteration budget.
    pub max_iterations: usize,
    /// Clustering cadence; 0 clusters once before any perturbation.
    pub max_iterations_with_clustering: usize,
    /// Stop once the smoothed best-point displacement falls under this;
    /// 0 disables the check.
    pub converge_distance: f64,
    /// Random seed for reproducibility.
    #[serde(default)]
    seed: Option<u64>,
}

impl CircuitOptimizer {
    /// Creates an optimizer with `population_size` candidates and default
    /// step control.
    #[must_use]
    pub fn new(population_size: usize) -> Self {
        Self {
            population_size,
            displacement_factor: 0.1,
            expansion_factor: 2.0,
            circuit_shuffliness: 0.0,
            max_iterations: 1000,
            max_iterations_with_clustering: 100,
            converge_distance: 0.0,
            seed: None,
        }
    }

    /// Sets the base Gaussian step size.
    #[must_use]
    pub fn with_displacement_factor(mut self, displacement_factor: f64) -> Self {
        self.displacement_factor = displacement_factor;
        self
    }

    /// Sets the stall expansion multiplier.
    #[must_use]
    pub fn with_expansion_factor(mut self, expansion_factor: f64) -> Self {
        self.expansion_factor = expansion_factor;
        self
    }

    /// Sets the per-generation ring reshuffle probability.
    #[must_use]
    pub fn with_circuit_shuffliness(mut self, circuit_shuffliness: f64) -> Self {
        self.circuit_shuffliness = circuit_shuffliness;
        self
    }

    /// Sets the internal iteration budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the clustering cadence (0 = cluster once up front).
    #[must_use]
    pub fn with_max_iterations_with_clustering(mut self, cadence: usize) -> Self {
        self.max_iterations_with_clustering = cadence;
        self
    }

    /// Sets the displacement stop threshold (0 disables).
    #[must_use]
    pub fn with_converge_distance(mut self, converge_distance: f64) -> Self {
        self.converge_distance = converge_distance;
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn make_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl GlobalOptimizer for CircuitOptimizer {
    fn optimize_observed(
        &self,
        dimension: usize,
        evaluator: &dyn Evaluator,
        observer: &mut dyn FnMut(Progress<'_>),
    ) -> Result<OptimizationOutcome> {
        check_dimension(dimension)?;
        let n = self.population_size;
        if n < 2 {
            return Err(UmbrafitError::InvalidHyperparameter {
                param: "population_size".to_string(),
                value: n.to_string(),
                constraint: "population_size >= 2".to_string(),
            });
        }

        let mut rng = self.make_rng();
        let raws = sample_initial(dimension, n, &mut rng);
        let mut population = evaluate_batch(evaluator, &raws)?;
        let mut evaluations = n;

        let mut best = population[best_index(&population)].clone();
        let mut prev_best = best.clone();
        let mut history = vec![best.error];

        let mut scales = vec![1.0_f64; n];
        let mut ring: Vec<usize> = (0..n).collect();
        let mut attractors: Vec<Option<usize>> = vec![None; n];
        let k = default_cluster_count(n);
        let cadence = self.max_iterations_with_clustering;
        if cadence == 0 {
            let clusters = partition_population(&population, k, &mut rng)?;
            attractors = cluster_attractors(&population, &clusters);
            ring = clusters.iter().flat_map(|c| c.members.iter().copied()).collect();
        }

        let mut checker = GradientReduction::new();
        checker.converged(0, None, &PointValue::new(best.position.clone(), best.error));
        let mut displacement = DisplacementTracker::default();
        let mut stall = 0usize;
        let mut termination = TerminationReason::MaxIterations;
        let mut iterations = 0;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;

            if cadence > 0 && iter % cadence == 0 {
                let clusters = partition_population(&population, k, &mut rng)?;
                attractors = cluster_attractors(&population, &clusters);
                ring = clusters.iter().flat_map(|c| c.members.iter().copied()).collect();
            }

            let mut ring_slot = vec![0usize; n];
            for (slot, &i) in ring.iter().enumerate() {
                ring_slot[i] = slot;
            }

            // Perturbation draws for the whole generation, then one batch
            // evaluation.
            let mut trials: Vec<Vec<f64>> = Vec::with_capacity(n);
            for i in 0..n {
                let slot = ring_slot[i];
                let left = ring[(slot + n - 1) % n];
                let right = ring[(slot + 1) % n];

                let mut trial = population[i].position.clone();
                let step = scales[i] * self.displacement_factor;
                for v in trial.iter_mut() {
                    *v += step * standard_normal(&mut rng);
                }

                // Drift toward the better finite ring neighbor; fall back to
                // the cluster attractor when both neighbors are undefined.
                let neighbor = [left, right]
                    .into_iter()
                    .filter(|&j| j != i && population[j].is_finite())
                    .min_by(|&a, &b| {
                        population[a]
                            .error
                            .partial_cmp(&population[b].error)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                let target = neighbor.or_else(|| attractors[i].filter(|&a| a != i));
                if let Some(t) = target {
                    if population[t].beats(&population[i]) {
                        let w = rng.random::<f64>() * self.displacement_factor;
                        for (v, (own, tv)) in trial
                            .iter_mut()
                            .zip(population[i].position.iter().zip(population[t].position.iter()))
                        {
                            *v += w * (tv - own);
                        }
                    }
                }
                trials.push(trial);
            }

            let trial_candidates = evaluate_batch(evaluator, &trials)?;
            evaluations += n;

            let mut improved_best = false;
            for (i, trial) in trial_candidates.into_iter().enumerate() {
                if trial.beats(&population[i]) {
                    population[i] = trial;
                    scales[i] = (scales[i] * SCALE_GROW).min(SCALE_MAX);
                    if population[i].beats(&best) {
                        best = population[i].clone();
                        improved_best = true;
                    }
                } else {
                    scales[i] = (scales[i] * SCALE_SHRINK).max(SCALE_MIN);
                }
            }

            if improved_best {
                stall = 0;
            } else {
                stall += 1;
                if stall >= STALL_LIMIT {
                    for scale in &mut scales {
                        *scale = (*scale * self.expansion_factor).min(SCALE_MAX);
                    }
                    stall = 0;
                }
            }

            // Reshuffle draws come last in the generation.
            if self.circuit_shuffliness > 0.0 && rng.random::<f64>() < self.circuit_shuffliness {
                ring.shuffle(&mut rng);
            }

            history.push(best.error);
            observer(Progress {
                phase: Phase::Search,
                iteration: iter,
                best: &best,
            });

            displacement.update(best_movement(&prev_best, &best));
            if displacement.settled(self.converge_distance) {
                termination = TerminationReason::Displacement;
                break;
            }
            let old_pv = PointValue::new(prev_best.position.clone(), prev_best.error);
            let new_pv = PointValue::new(best.position.clone(), best.error);
            if checker.converged(iter + 1, Some(&old_pv), &new_pv) {
                termination = TerminationReason::Plateau;
                break;
            }
            prev_best = best.clone();
        }

        Ok(OptimizationOutcome {
            point: best.position,
            error: best.error,
            evaluations,
            iterations,
            history,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_circuit_minimizes_sphere() {
        let opt = CircuitOptimizer::new(20).with_seed(42);
        let outcome = opt.optimize(5, &sphere).unwrap();
        assert!(
            outcome.error < 1e-2,
            "sphere not minimized: {}",
            outcome.error
        );
        assert!(outcome.point.iter().all(|v| v.abs() < 0.2));
    }

    #[test]
    fn test_circuit_rejects_zero_dimension() {
        let opt = CircuitOptimizer::new(10).with_seed(1);
        let err = opt.optimize(0, &sphere).unwrap_err();
        assert!(matches!(err, UmbrafitError::DegenerateInput { .. }));
    }

    #[test]
    fn test_circuit_rejects_tiny_population() {
        let opt = CircuitOptimizer::new(1).with_seed(1);
        let err = opt.optimize(3, &sphere).unwrap_err();
        assert!(matches!(err, UmbrafitError::InvalidHyperparameter { .. }));
    }

    #[test]
    fn test_circuit_history_non_increasing() {
        let opt = CircuitOptimizer::new(10)
            .with_seed(7)
            .with_max_iterations(100);
        let outcome = opt.optimize(4, &sphere).unwrap();
        for window in outcome.history.windows(2) {
            assert!(window[1] <= window[0]);
        }
        assert_eq!(outcome.history.len(), outcome.iterations + 1);
    }

    #[test]
    fn test_circuit_deterministic_under_seed() {
        let opt = CircuitOptimizer::new(12).with_seed(1030).with_max_iterations(60);
        let a = opt.optimize(3, &sphere).unwrap();
        let b = opt.optimize(3, &sphere).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_circuit_cluster_once_mode() {
        // Cadence 0 clusters exactly once, before any perturbation.
        let opt = CircuitOptimizer::new(10)
            .with_seed(3)
            .with_max_iterations_with_clustering(0)
            .with_max_iterations(80);
        let outcome = opt.optimize(3, &sphere).unwrap();
        assert!(outcome.error < 0.5);
    }

    #[test]
    fn test_circuit_converge_distance_stops_early() {
        let opt = CircuitOptimizer::new(10)
            .with_seed(5)
            .with_converge_distance(0.05)
            .with_max_iterations(1000);
        let outcome = opt.optimize(3, &sphere).unwrap();
        assert!(
            outcome.iterations < 1000,
            "displacement stop never fired ({} iterations)",
            outcome.iterations
        );
    }

    #[test]
    fn test_circuit_builder_fields() {
        let opt = CircuitOptimizer::new(20)
            .with_displacement_factor(0.03)
            .with_expansion_factor(3.0)
            .with_circuit_shuffliness(1.0)
            .with_max_iterations_with_clustering(200);
        assert_eq!(opt.population_size, 20);
        assert!((opt.displacement_factor - 0.03).abs() < 1e-12);
        assert!((opt.expansion_factor - 3.0).abs() < 1e-12);
        assert!((opt.circuit_shuffliness - 1.0).abs() < 1e-12);
        assert_eq!(opt.max_iterations_with_clustering, 200);
    }
}
