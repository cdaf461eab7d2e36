//! End-to-end acceptance tests shared by the three optimizer variants.
//!
//! Two bars every variant must clear: strictly beat the best of 200 seeded
//! Gaussian random samples on a 3-dimensional multimodal sinusoid-plus-bowl
//! objective, and recover a hidden 10-dimensional Gaussian target through a
//! squared-distance objective to within 0.01 on >95% of axes.

use rand::prelude::*;

use super::benchmarks::{offset_sphere, sinusoidal_bowl, sphere};
use super::{standard_normal, CircuitOptimizer, ClusteredGridSearch, ClusteredSwarm};
use super::{GlobalOptimizer, Phase, TerminationReason};
use crate::error::{Result, UmbrafitError};
use crate::evaluate::{Evaluation, Evaluator};

fn gaussian_vector(rng: &mut StdRng, dimension: usize) -> Vec<f64> {
    (0..dimension).map(|_| standard_normal(rng)).collect()
}

/// Best of 200 Gaussian(sigma = 1) random samples of the multimodal
/// objective, from a fixed seed.
fn random_sampling_baseline() -> f64 {
    let mut rng = StdRng::seed_from_u64(1030);
    let mut best = f64::INFINITY;
    for _ in 0..200 {
        let value = sinusoidal_bowl(&gaussian_vector(&mut rng, 3));
        if value < best {
            best = value;
        }
    }
    best
}

fn check_beats_random_baseline(optimizer: &dyn GlobalOptimizer) {
    let baseline = random_sampling_baseline();
    let outcome = optimizer.optimize(3, &sinusoidal_bowl).unwrap();
    assert!(
        outcome.error < baseline,
        "optimizer error {} did not beat random baseline {}",
        outcome.error,
        baseline
    );
}

fn check_recovers_hidden_target(optimizer: &dyn GlobalOptimizer) {
    let mut rng = StdRng::seed_from_u64(1023);
    let target = gaussian_vector(&mut rng, 10);
    let objective = offset_sphere(target.clone());

    let outcome = optimizer.optimize(10, &objective).unwrap();
    let recovered = target
        .iter()
        .zip(outcome.point.iter())
        .filter(|(t, p)| (*t - *p).abs() <= 0.01)
        .count();
    assert!(
        recovered as f64 / target.len() as f64 > 0.95,
        "only {recovered}/10 axes recovered: {:?} vs {:?}",
        outcome.point,
        target
    );
    let msd = outcome
        .point
        .iter()
        .zip(target.iter())
        .map(|(p, t)| (p - t) * (p - t))
        .sum::<f64>()
        / target.len() as f64;
    assert!(msd < 0.01, "mean squared distance per axis {msd} too large");
}

#[test]
fn test_circuit_beats_random_baseline() {
    let opt = CircuitOptimizer::new(20)
        .with_expansion_factor(3.0)
        .with_max_iterations_with_clustering(200)
        .with_displacement_factor(0.03)
        .with_circuit_shuffliness(1.0)
        .with_seed(1030);
    check_beats_random_baseline(&opt);
}

#[test]
fn test_circuit_recovers_hidden_target() {
    let opt = CircuitOptimizer::new(20)
        .with_max_iterations_with_clustering(0)
        .with_displacement_factor(0.3)
        .with_circuit_shuffliness(0.0)
        .with_expansion_factor(2.0)
        .with_converge_distance(0.003)
        .with_seed(1023);
    check_recovers_hidden_target(&opt);
}

#[test]
fn test_swarm_beats_random_baseline() {
    let opt = ClusteredSwarm::new(20)
        .with_attraction(2.0)
        .with_inertia(0.05)
        .with_seed(1030);
    check_beats_random_baseline(&opt);
}

#[test]
fn test_swarm_recovers_hidden_target() {
    let opt = ClusteredSwarm::new(20)
        .with_attraction(3.0)
        .with_inertia(0.1)
        .with_max_consolidation_iterations(300)
        .with_converge_distance(0.001)
        .with_seed(1023);
    check_recovers_hidden_target(&opt);
}

#[test]
fn test_grid_beats_random_baseline() {
    let opt = ClusteredGridSearch::new(7, 10)
        .with_max_iterations(200)
        .with_seed(1030);
    check_beats_random_baseline(&opt);
}

#[test]
fn test_grid_recovers_hidden_target() {
    let opt = ClusteredGridSearch::new(7, 10)
        .with_max_iterations(200)
        .with_seed(1023);
    check_recovers_hidden_target(&opt);
}

struct FailsAfter {
    budget: usize,
    calls: std::sync::atomic::AtomicUsize,
}

impl Evaluator for FailsAfter {
    fn evaluate(&self, raw: &[f64]) -> Result<Evaluation> {
        let seen = self
            .calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if seen >= self.budget {
            return Err(UmbrafitError::Evaluation {
                message: "light-curve renderer failed".to_string(),
            });
        }
        Ok(Evaluation::new(sphere(raw), raw.to_vec()))
    }
}

#[test]
fn test_mid_run_evaluation_error_aborts() {
    // The failure surfaces after the initial population, partway through a
    // later generation, and must abort the whole run uncaught.
    let evaluator = FailsAfter {
        budget: 45,
        calls: std::sync::atomic::AtomicUsize::new(0),
    };
    let opt = CircuitOptimizer::new(20).with_seed(2);
    let err = opt.optimize(3, &evaluator).unwrap_err();
    assert!(matches!(err, UmbrafitError::Evaluation { .. }));
}

#[test]
fn test_partially_undefined_landscape_still_optimized() {
    // NaN outside the unit ball: most of the initial box is undefined, yet
    // the population must keep exploring and land inside the defined region.
    let partial = |x: &[f64]| {
        let r2 = sphere(x);
        if r2 > 1.0 {
            f64::NAN
        } else {
            r2
        }
    };
    for outcome in [
        CircuitOptimizer::new(20).with_seed(6).optimize(3, &partial),
        ClusteredSwarm::new(20).with_seed(6).optimize(3, &partial),
        ClusteredGridSearch::new(4, 8).with_seed(6).optimize(3, &partial),
    ] {
        let outcome = outcome.unwrap();
        assert!(
            outcome.error.is_finite() && outcome.error < 0.5,
            "stuck on undefined region: {}",
            outcome.error
        );
    }
}

#[test]
fn test_progress_hook_runs_every_iteration() {
    let opt = CircuitOptimizer::new(10).with_seed(4).with_max_iterations(30);
    let mut seen = Vec::new();
    let outcome = opt
        .optimize_observed(3, &sphere, &mut |p| {
            assert_eq!(p.phase, Phase::Search);
            seen.push((p.iteration, p.best.error));
        })
        .unwrap();
    assert_eq!(seen.len(), outcome.iterations);
    for window in seen.windows(2) {
        assert!(window[1].1 <= window[0].1, "observed best regressed");
    }
    assert!((seen.last().unwrap().1 - outcome.error).abs() < 1e-15);
}

#[test]
fn test_max_iterations_termination_reason() {
    let opt = CircuitOptimizer::new(10).with_seed(9).with_max_iterations(5);
    let outcome = opt.optimize(3, &sphere).unwrap();
    assert_eq!(outcome.iterations, 5);
    assert_eq!(outcome.termination, TerminationReason::MaxIterations);
}

#[test]
fn test_optimizer_configs_survive_serde() {
    let circuit = CircuitOptimizer::new(20)
        .with_displacement_factor(0.03)
        .with_seed(1030);
    let json = serde_json::to_string(&circuit).unwrap();
    let back: CircuitOptimizer = serde_json::from_str(&json).unwrap();
    assert_eq!(back, circuit);

    let swarm = ClusteredSwarm::new(30).with_attraction(3.0).with_seed(7);
    let json = serde_json::to_string(&swarm).unwrap();
    let back: ClusteredSwarm = serde_json::from_str(&json).unwrap();
    assert_eq!(back, swarm);

    let grid = ClusteredGridSearch::new(7, 10).with_max_iterations(200);
    let json = serde_json::to_string(&grid).unwrap();
    let back: ClusteredGridSearch = serde_json::from_str(&json).unwrap();
    assert_eq!(back, grid);
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_circuit_never_worse_than_initial_best(
            seed in 0u64..1_000,
            dimension in 1usize..5,
        ) {
            let opt = CircuitOptimizer::new(8)
                .with_seed(seed)
                .with_max_iterations(40);
            let outcome = opt.optimize(dimension, &sphere).unwrap();
            prop_assert_eq!(outcome.point.len(), dimension);
            prop_assert!(outcome.error <= outcome.history[0]);
            for window in outcome.history.windows(2) {
                prop_assert!(window[1] <= window[0]);
            }
        }

        #[test]
        fn prop_runs_are_reproducible(seed in 0u64..1_000) {
            let opt = ClusteredSwarm::new(8)
                .with_seed(seed)
                .with_max_iterations(25);
            let a = opt.optimize(3, &sphere).unwrap();
            let b = opt.optimize(3, &sphere).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
