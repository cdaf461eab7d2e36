//! # umbrafit
//!
//! Gradient-free global optimization core for fitting occulting-shape
//! light-curve models, built from four pieces:
//!
//! - [`codec`] - maps a symmetric-range raw vector onto named, physically
//!   bounded parameters (linear or exponential) with a soft out-of-range
//!   penalty
//! - [`cluster`] - k-means partitioning of candidate populations into
//!   local-search neighborhoods
//! - [`convergence`] - gradient-reduction plateau detection
//! - [`optimizer`] - three population metaheuristics (ring perturbation,
//!   clustered swarm, clustered grid search) behind one
//!   [`GlobalOptimizer`](optimizer::GlobalOptimizer) trait
//!
//! The domain layer (renderers, opacity models) stays outside: it supplies
//! an [`Evaluator`](evaluate::Evaluator) and reads back the best raw vector.
//! Every run is a pure function of `(seed, dimensionality, evaluator,
//! hyperparameters)`.
//!
//! # Quick start
//!
//! ```
//! use umbrafit::prelude::*;
//!
//! // Two physical parameters behind a 2-component raw vector.
//! let mut codec = ParameterCodec::new();
//! codec.add_linear("tilt_deg", -45.0, 45.0)?;
//! codec.add_exponential("radius_km", 1.0, 1e4)?;
//!
//! // Toy objective: prefer a 10 degree tilt and a 100 km radius.
//! let objective = move |raw: &[f64]| {
//!     let tilt = codec.decode("tilt_deg", raw).unwrap();
//!     let radius = codec.decode("radius_km", raw).unwrap();
//!     (tilt - 10.0).powi(2) / 45.0 + (radius.log10() - 2.0).powi(2)
//! };
//!
//! let optimizer = CircuitOptimizer::new(20).with_seed(42);
//! let outcome = optimizer.optimize(2, &objective)?;
//! assert!(outcome.error < 0.05);
//! # Ok::<(), umbrafit::UmbrafitError>(())
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod codec;
pub mod convergence;
pub mod error;
pub mod evaluate;
pub mod optimizer;
pub mod prelude;

pub use error::{Result, UmbrafitError};
