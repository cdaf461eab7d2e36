//! Population-based, gradient-free global optimizers.
//!
//! Three variants share population management, periodic k-means clustering
//! into local-search neighborhoods, and gradient-reduction plateau
//! detection; they differ in how candidates move:
//!
//! - [`CircuitOptimizer`] - population on a logical ring, adaptive Gaussian
//!   perturbation with neighbor drift and stall-triggered expansion
//! - [`ClusteredSwarm`] - velocity-based swarm with inertia and attraction
//!   toward personal/cluster bests, plus a bounded consolidation phase
//! - [`ClusteredGridSearch`] - structured probe grids seeded inside a fixed
//!   number of clusters, re-centered and rescaled each generation
//!
//! # Reproducibility
//!
//! A run is a pure function of `(seed, dimensionality, evaluator,
//! hyperparameters)`. Randomness is consumed in a fixed order: initial
//! population sampling first, then per generation the clustering centroid
//! draws (when a clustering pass is due), the perturbation draws, and last
//! the reshuffle/velocity draws. Candidate evaluations within a generation
//! are independent and are scored in parallel, then folded back in index
//! order before clustering and convergence run.
//!
//! # Undefined landscapes
//!
//! A NaN error marks a candidate as maximally unfit: it loses every
//! comparison against a finite candidate, is excluded from attractor and
//! neighbor-drift selection, but stays in the population so its region keeps
//! being explored.

use rand::prelude::*;
use rayon::prelude::*;

use crate::cluster::{euclidean_distance, Cluster, VectorKMeans};
use crate::codec::RAW_BOUND;
use crate::error::{Result, UmbrafitError};
use crate::evaluate::{Candidate, Evaluator};

pub mod benchmarks;
mod circuit;
mod grid;
mod swarm;

pub use circuit::CircuitOptimizer;
pub use grid::ClusteredGridSearch;
pub use swarm::ClusteredSwarm;

#[cfg(test)]
mod tests;

/// Which part of a run an observation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Main population search.
    Search,
    /// Post-search local refinement (swarm variant only).
    Consolidation,
}

/// Snapshot handed to the progress observer after each iteration.
///
/// Observers run synchronously on the optimizer's thread and only see a
/// shared borrow of the current best, so they cannot mutate optimizer state.
#[derive(Debug)]
pub struct Progress<'a> {
    /// Phase the iteration belongs to.
    pub phase: Phase,
    /// Iteration index within the run.
    pub iteration: usize,
    /// Best candidate found so far.
    pub best: &'a Candidate,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TerminationReason {
    /// The gradient-reduction checker flagged a plateau.
    Plateau,
    /// Accumulated best-point displacement fell under the configured
    /// converge distance (or every probe span collapsed, for the grid
    /// variant).
    Displacement,
    /// The internal iteration budget ran out.
    MaxIterations,
}

/// Result of one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    /// Best resolved raw vector found.
    pub point: Vec<f64>,
    /// Total error at that point.
    pub error: f64,
    /// Number of evaluator calls consumed.
    pub evaluations: usize,
    /// Number of iterations run (all phases).
    pub iterations: usize,
    /// Best error after each iteration; non-increasing.
    pub history: Vec<f64>,
    /// Why the run stopped.
    pub termination: TerminationReason,
}

/// Common contract of the optimizer family.
pub trait GlobalOptimizer {
    /// Runs one optimization and returns the best (point, error) pair found.
    ///
    /// # Errors
    ///
    /// Propagates evaluator failures unchanged and rejects degenerate
    /// dimensionality or hyperparameters before any evaluation happens.
    fn optimize(&self, dimension: usize, evaluator: &dyn Evaluator) -> Result<OptimizationOutcome> {
        self.optimize_observed(dimension, evaluator, &mut |_| {})
    }

    /// Like [`GlobalOptimizer::optimize`], invoking `observer` synchronously
    /// after each iteration.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`GlobalOptimizer::optimize`].
    fn optimize_observed(
        &self,
        dimension: usize,
        evaluator: &dyn Evaluator,
        observer: &mut dyn FnMut(Progress<'_>),
    ) -> Result<OptimizationOutcome>;
}

/// Rejects a zero-dimensional search space.
pub(crate) fn check_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 {
        return Err(UmbrafitError::DegenerateInput {
            message: "cannot optimize a zero-dimensional space".to_string(),
        });
    }
    Ok(())
}

/// One standard-normal draw via Box-Muller (two uniform draws per call).
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-300);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Samples `count` starting positions uniformly over the canonical raw box.
pub(crate) fn sample_initial<R: Rng + ?Sized>(
    dimension: usize,
    count: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    (0..count)
        .map(|_| {
            (0..dimension)
                .map(|_| rng.random_range(-RAW_BOUND..=RAW_BOUND))
                .collect()
        })
        .collect()
}

/// Scores a batch of raw vectors in parallel and folds the results back in
/// index order. The only synchronization barrier in a generation.
pub(crate) fn evaluate_batch(
    evaluator: &dyn Evaluator,
    raws: &[Vec<f64>],
) -> Result<Vec<Candidate>> {
    raws.par_iter()
        .map(|raw| evaluator.evaluate(raw).map(Candidate::from_evaluation))
        .collect()
}

/// Index of the best candidate under NaN-aware ordering. Assumes a
/// non-empty slice; ties keep the earliest index.
pub(crate) fn best_index(candidates: &[Candidate]) -> usize {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        if c.beats(&candidates[best]) {
            best = i;
        }
    }
    best
}

/// Cluster count used when a variant does not fix one explicitly.
pub(crate) fn default_cluster_count(population: usize) -> usize {
    (population / 5).max(2).min(population)
}

/// Runs a clustering pass over the current candidate positions.
pub(crate) fn partition_population<R: Rng + ?Sized>(
    candidates: &[Candidate],
    k: usize,
    rng: &mut R,
) -> Result<Vec<Cluster>> {
    let positions: Vec<Vec<f64>> = candidates.iter().map(|c| c.position.clone()).collect();
    VectorKMeans::new(k).partition(&positions, rng)
}

/// For each candidate, the index of the best finite candidate in its
/// cluster, if the cluster has one. NaN members never become attractors.
pub(crate) fn cluster_attractors(
    candidates: &[Candidate],
    clusters: &[Cluster],
) -> Vec<Option<usize>> {
    let mut attractor = vec![None; candidates.len()];
    for cluster in clusters {
        let best = cluster
            .members
            .iter()
            .copied()
            .filter(|&m| candidates[m].is_finite())
            .min_by(|&a, &b| {
                candidates[a]
                    .error
                    .partial_cmp(&candidates[b].error)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some(best) = best {
            for &m in &cluster.members {
                attractor[m] = Some(best);
            }
        }
    }
    attractor
}

/// Smoothed tracker of how far the global best moved between generations.
/// Used for the `converge_distance` stop.
#[derive(Debug, Clone, Default)]
pub(crate) struct DisplacementTracker {
    ema: Option<f64>,
    samples: usize,
}

impl DisplacementTracker {
    const SMOOTHING: f64 = 0.2;
    const WARMUP: usize = 25;

    pub(crate) fn update(&mut self, moved: f64) {
        self.samples += 1;
        self.ema = Some(match self.ema {
            Some(ema) => Self::SMOOTHING * moved + (1.0 - Self::SMOOTHING) * ema,
            None => moved,
        });
    }

    /// True once the smoothed displacement has settled under `threshold`.
    /// Disabled while `threshold` is not positive or during warmup.
    pub(crate) fn settled(&self, threshold: f64) -> bool {
        threshold > 0.0
            && self.samples >= Self::WARMUP
            && self.ema.is_some_and(|ema| ema < threshold)
    }
}

/// Distance the best moved this generation, for the displacement tracker.
pub(crate) fn best_movement(previous: &Candidate, current: &Candidate) -> f64 {
    euclidean_distance(&previous.position, &current.position)
}
