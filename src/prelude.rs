//! Convenience re-exports of the types most callers need.
//!
//! ```
//! use umbrafit::prelude::*;
//! ```

pub use crate::cluster::{Cluster, VectorKMeans};
pub use crate::codec::{ParameterCodec, RAW_BOUND};
pub use crate::convergence::{GradientReduction, PointValue};
pub use crate::error::{Result, UmbrafitError};
pub use crate::evaluate::{Candidate, Evaluation, Evaluator};
pub use crate::optimizer::{
    CircuitOptimizer, ClusteredGridSearch, ClusteredSwarm, GlobalOptimizer, OptimizationOutcome,
    Phase, Progress, TerminationReason,
};
