//! Clustered evolutionary swarm optimizer.
//!
//! Velocity-based particle swarm where the social attractor is the best
//! member of each particle's cluster rather than a single global best, so
//! separate clusters refine separate basins concurrently. An optional
//! consolidation phase follows the main search: a coordinate pattern search
//! around the best point with per-axis probe scales that halve on failure,
//! which polishes the final axes far below what swarm steps resolve.
//!
//! # Algorithm
//!
//! Per generation, for particle `i` with position `x`, velocity `v`,
//! personal best `p` and cluster best `c`:
//!
//! ```text
//! v[j] <- inertia * v[j]
//!         + attraction * r1[j] * (p[j] - x[j])
//!         + attraction * r2[j] * (c[j] - x[j])
//! x[j] <- x[j] + clamp(v[j], -velocity_limit, velocity_limit)
//! ```
//!
//! with `r1`, `r2` uniform in `[0, 1)` per axis. A particle whose personal
//! best is undefined (NaN) skips the personal term; a cluster with no finite
//! member contributes no social term.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    best_index, best_movement, check_dimension, cluster_attractors, default_cluster_count,
    evaluate_batch, partition_population, sample_initial, DisplacementTracker, GlobalOptimizer,
    OptimizationOutcome, Phase, Progress, TerminationReason,
};
use crate::convergence::{GradientReduction, PointValue};
use crate::error::{Result, UmbrafitError};
use crate::evaluate::{Candidate, Evaluator};

/// Probe scale floor below which consolidation stops.
const EPSILON_FLOOR: f64 = 1e-10;
/// Fallback per-axis probe scale when the evaluator recommends none.
const DEFAULT_EPSILON: f64 = 0.05;

/// Cluster-attracted particle swarm.
///
/// # Example
///
/// ```
/// use umbrafit::optimizer::{ClusteredSwarm, GlobalOptimizer};
///
/// let sphere = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
/// let opt = ClusteredSwarm::new(30).with_seed(7);
/// let outcome = opt.optimize(3, &sphere).unwrap();
/// assert!(outcome.error < 0.1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredSwarm {
    /// Number of particles.
    pub population_size: usize,
    /// Velocity carry-over per generation; the swarm-literature `omega`
    /// coefficient, accepted under that name when deserializing.
    #[serde(alias = "omega")]
    pub inertia: f64,
    /// Strength of the pull toward personal and cluster bests; the
    /// swarm-literature `phi` coefficient, accepted under that name when
    /// deserializing.
    #[serde(alias = "phi")]
    pub attraction: f64,
    /// Per-axis velocity clamp, in raw-space units.
    pub velocity_limit: f64,
    /// Main-phase iteration budget.
    pub max_iterations: usize,
    /// Clustering cadence; 0 clusters once before any movement.
    pub max_iterations_with_clustering: usize,
    /// Consolidation-phase iteration budget; 0 skips the phase.
    pub max_consolidation_iterations: usize,
    /// Stop the main phase once the smoothed best-point displacement falls
    /// under this; 0 disables the check.
    pub converge_distance: f64,
    /// Random seed for reproducibility.
    #[serde(default)]
    seed: Option<u64>,
}

impl ClusteredSwarm {
    /// Creates a swarm with `population_size` particles and default motion
    /// coefficients.
    #[must_use]
    pub fn new(population_size: usize) -> Self {
        Self {
            population_size,
            inertia: 0.5,
            attraction: 1.8,
            velocity_limit: 1.0,
            max_iterations: 1000,
            max_iterations_with_clustering: 100,
            max_consolidation_iterations: 0,
            converge_distance: 0.0,
            seed: None,
        }
    }

    /// Sets the velocity carry-over coefficient (`omega`).
    #[must_use]
    pub fn with_inertia(mut self, inertia: f64) -> Self {
        self.inertia = inertia;
        self
    }

    /// Sets the attraction strength toward personal and cluster bests
    /// (`phi`).
    #[must_use]
    pub fn with_attraction(mut self, attraction: f64) -> Self {
        self.attraction = attraction;
        self
    }

    /// Sets the per-axis velocity clamp.
    #[must_use]
    pub fn with_velocity_limit(mut self, velocity_limit: f64) -> Self {
        self.velocity_limit = velocity_limit;
        self
    }

    /// Sets the main-phase iteration budget.
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

    /// Sets the consolidation-phase budget (0 = no consolidation).
    #[must_use]
    pub fn with_max_consolidation_iterations(mut self, budget: usize) -> Self {
        self.max_consolidation_iterations = budget;
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

    /// Coordinate pattern search around `best`. Each iteration probes
    /// `best +/- epsilon[j]` along every axis, takes the single best
    /// improving probe, and halves every probe scale when none improves.
    fn consolidate(
        &self,
        dimension: usize,
        evaluator: &dyn Evaluator,
        observer: &mut dyn FnMut(Progress<'_>),
        best: &mut Candidate,
        evaluations: &mut usize,
        iterations: &mut usize,
        history: &mut Vec<f64>,
    ) -> Result<()> {
        let mut epsilon = evaluator
            .recommend_epsilon(&best.position)
            .unwrap_or_else(|| vec![DEFAULT_EPSILON; dimension]);

        for iter in 0..self.max_consolidation_iterations {
            *iterations += 1;

            let mut probes = Vec::with_capacity(2 * dimension);
            for axis in 0..dimension {
                for sign in [1.0, -1.0] {
                    let mut probe = best.position.clone();
                    probe[axis] += sign * epsilon[axis];
                    probes.push(probe);
                }
            }
            let scored = evaluate_batch(evaluator, &probes)?;
            *evaluations += probes.len();

            let winner = best_index(&scored);
            if scored[winner].beats(best) {
                *best = scored[winner].clone();
                epsilon = evaluator
                    .recommend_epsilon(&best.position)
                    .unwrap_or(epsilon);
            } else {
                for eps in &mut epsilon {
                    *eps *= 0.5;
                }
            }

            history.push(best.error);
            observer(Progress {
                phase: Phase::Consolidation,
                iteration: iter,
                best,
            });

            if epsilon.iter().all(|eps| *eps < EPSILON_FLOOR) {
                break;
            }
        }
        Ok(())
    }
}

impl GlobalOptimizer for ClusteredSwarm {
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
        if self.velocity_limit <= 0.0 {
            return Err(UmbrafitError::InvalidHyperparameter {
                param: "velocity_limit".to_string(),
                value: self.velocity_limit.to_string(),
                constraint: "velocity_limit > 0".to_string(),
            });
        }

        let mut rng = self.make_rng();
        let raws = sample_initial(dimension, n, &mut rng);
        let mut positions = raws;
        let initial = evaluate_batch(evaluator, &positions)?;
        let mut evaluations = n;

        let mut personal: Vec<Candidate> = initial;
        let mut best = personal[best_index(&personal)].clone();
        let mut prev_best = best.clone();
        let mut history = vec![best.error];

        let mut velocities = vec![vec![0.0_f64; dimension]; n];
        let mut attractors: Vec<Option<usize>> = vec![None; n];
        let k = default_cluster_count(n);
        let cadence = self.max_iterations_with_clustering;
        if cadence == 0 {
            let clusters = partition_population(&personal, k, &mut rng)?;
            attractors = cluster_attractors(&personal, &clusters);
        }

        let mut checker = GradientReduction::new();
        checker.converged(0, None, &PointValue::new(best.position.clone(), best.error));
        let mut displacement = DisplacementTracker::default();
        let mut termination = TerminationReason::MaxIterations;
        let mut iterations = 0;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;

            if cadence > 0 && iter % cadence == 0 {
                let clusters = partition_population(&personal, k, &mut rng)?;
                attractors = cluster_attractors(&personal, &clusters);
            }

            for i in 0..n {
                let social = attractors[i].map(|a| personal[a].position.clone());
                for j in 0..dimension {
                    let mut v = self.inertia * velocities[i][j];
                    if personal[i].is_finite() {
                        let r1: f64 = rng.random();
                        v += self.attraction * r1 * (personal[i].position[j] - positions[i][j]);
                    }
                    if let Some(social) = &social {
                        let r2: f64 = rng.random();
                        v += self.attraction * r2 * (social[j] - positions[i][j]);
                    }
                    velocities[i][j] = v.clamp(-self.velocity_limit, self.velocity_limit);
                    positions[i][j] += velocities[i][j];
                }
            }

            let scored = evaluate_batch(evaluator, &positions)?;
            evaluations += n;
            for (i, candidate) in scored.into_iter().enumerate() {
                if candidate.beats(&personal[i]) {
                    personal[i] = candidate;
                    if personal[i].beats(&best) {
                        best = personal[i].clone();
                    }
                }
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

        if self.max_consolidation_iterations > 0 && best.is_finite() {
            self.consolidate(
                dimension,
                evaluator,
                observer,
                &mut best,
                &mut evaluations,
                &mut iterations,
                &mut history,
            )?;
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
