//! Clustered grid-pattern search.
//!
//! Seeds `cluster_count * particles_per_cluster` points, partitions them
//! once (or periodically) with k-means, then runs one structured probe grid
//! per cluster: axis-aligned `+/- span` probes that cycle through the axes,
//! topped up with Gaussian fill probes when the per-cluster budget exceeds
//! `2 * dimension`. A cluster whose best probe improves its center moves
//! there and grows its span; otherwise the span contracts, so each grid
//! telescopes onto its own local minimum. The run stops when every span has
//! collapsed, on plateau, or when the iteration budget runs out.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    best_index, best_movement, check_dimension, evaluate_batch, partition_population,
    sample_initial, standard_normal, DisplacementTracker, GlobalOptimizer, OptimizationOutcome,
    Phase, Progress, TerminationReason,
};
use crate::cluster::{euclidean_distance, Cluster};
use crate::convergence::{GradientReduction, PointValue};
use crate::error::{Result, UmbrafitError};
use crate::evaluate::{Candidate, Evaluator};

const SPAN_GROW: f64 = 1.2;
const SPAN_SHRINK: f64 = 0.6;
const SPAN_MAX: f64 = 2.0;
const SPAN_MIN: f64 = 1e-12;
const SPAN_FLOOR_INITIAL: f64 = 0.25;
/// All-spans-collapsed stop threshold.
const SPAN_SETTLED: f64 = 1e-10;

/// One telescoping probe grid.
#[derive(Debug, Clone)]
struct Cell {
    center: Candidate,
    span: f64,
    /// First axis the next pattern pass probes.
    cursor: usize,
}

/// Grid-pattern optimizer over a fixed number of clusters.
///
/// # Example
///
/// ```
/// use umbrafit::optimizer::{ClusteredGridSearch, GlobalOptimizer};
///
/// let sphere = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
/// let opt = ClusteredGridSearch::new(4, 8).with_seed(21);
/// let outcome = opt.optimize(3, &sphere).unwrap();
/// assert!(outcome.error < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredGridSearch {
    /// Number of concurrent probe grids.
    pub cluster_count: usize,
    /// Probe budget per grid per iteration.
    pub particles_per_cluster: usize,
    /// Internal iteration budget.
    pub max_iterations: usize,
    /// Re-clustering cadence; 0 clusters once before any probing.
    pub max_iterations_with_clustering: usize,
    /// Stop once the smoothed best-point displacement falls under this;
    /// 0 disables the check.
    pub converge_distance: f64,
    /// Random seed for reproducibility.
    #[serde(default)]
    seed: Option<u64>,
}

impl ClusteredGridSearch {
    /// Creates a grid search with `cluster_count` grids of
    /// `particles_per_cluster` probes each.
    #[must_use]
    pub fn new(cluster_count: usize, particles_per_cluster: usize) -> Self {
        Self {
            cluster_count,
            particles_per_cluster,
            max_iterations: 1000,
            max_iterations_with_clustering: 0,
            converge_distance: 0.0,
            seed: None,
        }
    }

    /// Sets the internal iteration budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the re-clustering cadence (0 = cluster once up front).
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

    /// Rebuilds the per-cluster grids from a clustering of `scored`. An
    /// empty cluster restarts its grid at the current global best.
    fn build_cells(clusters: &[Cluster], scored: &[Candidate], global_best: &Candidate) -> Vec<Cell> {
        clusters
            .iter()
            .map(|cluster| {
                let members: Vec<&Candidate> =
                    cluster.members.iter().map(|&m| &scored[m]).collect();
                if members.is_empty() {
                    return Cell {
                        center: global_best.clone(),
                        span: 0.5,
                        cursor: 0,
                    };
                }
                let mut best = 0;
                for (i, member) in members.iter().enumerate().skip(1) {
                    if member.beats(members[best]) {
                        best = i;
                    }
                }
                let center = members[best].clone();
                let mean_distance = members
                    .iter()
                    .map(|m| euclidean_distance(&m.position, &center.position))
                    .sum::<f64>()
                    / members.len() as f64;
                Cell {
                    span: mean_distance.max(SPAN_FLOOR_INITIAL),
                    center,
                    cursor: 0,
                }
            })
            .collect()
    }
}

impl GlobalOptimizer for ClusteredGridSearch {
    fn optimize_observed(
        &self,
        dimension: usize,
        evaluator: &dyn Evaluator,
        observer: &mut dyn FnMut(Progress<'_>),
    ) -> Result<OptimizationOutcome> {
        check_dimension(dimension)?;
        let k = self.cluster_count;
        let m = self.particles_per_cluster;
        if k == 0 || m == 0 || k * m < 2 {
            return Err(UmbrafitError::InvalidHyperparameter {
                param: "cluster_count * particles_per_cluster".to_string(),
                value: format!("{k} * {m}"),
                constraint: "at least 2 probes total, both factors nonzero".to_string(),
            });
        }

        let mut rng = self.make_rng();
        let raws = sample_initial(dimension, k * m, &mut rng);
        let mut scored = evaluate_batch(evaluator, &raws)?;
        let mut evaluations = k * m;

        let mut best = scored[best_index(&scored)].clone();
        let mut prev_best = best.clone();
        let mut history = vec![best.error];

        let clusters = partition_population(&scored, k, &mut rng)?;
        let mut cells = Self::build_cells(&clusters, &scored, &best);
        let cadence = self.max_iterations_with_clustering;

        let mut checker = GradientReduction::new();
        checker.converged(0, None, &PointValue::new(best.position.clone(), best.error));
        let mut displacement = DisplacementTracker::default();
        let mut termination = TerminationReason::MaxIterations;
        let mut iterations = 0;

        for iter in 0..self.max_iterations {
            iterations = iter + 1;

            if cadence > 0 && iter > 0 && iter % cadence == 0 {
                let clusters = partition_population(&scored, k, &mut rng)?;
                cells = Self::build_cells(&clusters, &scored, &best);
            }

            // One batch holds every grid's probes; cell c owns the slice
            // [c * m, (c + 1) * m).
            let axis_probes = m.min(2 * dimension);
            let mut probes: Vec<Vec<f64>> = Vec::with_capacity(k * m);
            for cell in &cells {
                for t in 0..m {
                    let mut probe = cell.center.position.clone();
                    if t < axis_probes {
                        let axis = (cell.cursor + t / 2) % dimension;
                        let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
                        probe[axis] += sign * cell.span;
                    } else {
                        for v in probe.iter_mut() {
                            *v += cell.span * standard_normal(&mut rng);
                        }
                    }
                    probes.push(probe);
                }
            }
            scored = evaluate_batch(evaluator, &probes)?;
            evaluations += probes.len();

            for (c, cell) in cells.iter_mut().enumerate() {
                let slice = &scored[c * m..(c + 1) * m];
                let mut winner = 0;
                for (i, probe) in slice.iter().enumerate().skip(1) {
                    if probe.beats(&slice[winner]) {
                        winner = i;
                    }
                }
                if slice[winner].beats(&cell.center) {
                    cell.center = slice[winner].clone();
                    cell.span = (cell.span * SPAN_GROW).min(SPAN_MAX);
                    if cell.center.beats(&best) {
                        best = cell.center.clone();
                    }
                } else {
                    cell.span = (cell.span * SPAN_SHRINK).max(SPAN_MIN);
                }
                cell.cursor = (cell.cursor + axis_probes.div_ceil(2)) % dimension;
            }

            history.push(best.error);
            observer(Progress {
                phase: Phase::Search,
                iteration: iter,
                best: &best,
            });

            if cells.iter().all(|cell| cell.span < SPAN_SETTLED) {
                termination = TerminationReason::Displacement;
                break;
            }
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
