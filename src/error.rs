//! Error types for umbrafit operations.
//!
//! Configuration errors are raised at setup time and fail fast; evaluation
//! errors abort an optimization run and propagate to the caller unchanged.

use std::fmt;

/// Main error type for umbrafit operations.
///
/// # Examples
///
/// ```
/// use umbrafit::error::UmbrafitError;
///
/// let err = UmbrafitError::UnknownParameter {
///     id: "ring_radius".to_string(),
/// };
/// assert!(err.to_string().contains("ring_radius"));
/// ```
#[derive(Debug)]
pub enum UmbrafitError {
    /// A parameter id was registered twice with the codec.
    DuplicateParameter {
        /// Offending parameter id
        id: String,
    },

    /// A decode was requested for a parameter id that was never registered.
    UnknownParameter {
        /// Requested parameter id
        id: String,
    },

    /// Parameter bounds are malformed (non-finite, inverted, or non-positive
    /// for an exponential slot).
    InvalidBounds {
        /// Parameter id the bounds belong to
        id: String,
        /// Lower bound as given
        min: f64,
        /// Upper bound as given
        max: f64,
        /// Constraint that was violated
        constraint: String,
    },

    /// Vector length does not match what the operation requires.
    DimensionMismatch {
        /// Expected length description
        expected: String,
        /// Actual length found
        actual: String,
    },

    /// Invalid hyperparameter value provided to an optimizer or the
    /// clustering engine.
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Degenerate input that leaves the operation undefined (e.g. an empty
    /// candidate set passed to clustering).
    DegenerateInput {
        /// What was degenerate about the input
        message: String,
    },

    /// The caller-supplied evaluator failed while scoring a candidate.
    Evaluation {
        /// Error details from the domain layer
        message: String,
    },
}

impl fmt::Display for UmbrafitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UmbrafitError::DuplicateParameter { id } => {
                write!(f, "Parameter '{id}' is already registered")
            }
            UmbrafitError::UnknownParameter { id } => {
                write!(f, "Parameter '{id}' is not registered")
            }
            UmbrafitError::InvalidBounds {
                id,
                min,
                max,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid bounds [{min}, {max}] for parameter '{id}': {constraint}"
                )
            }
            UmbrafitError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            UmbrafitError::InvalidHyperparameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid hyperparameter {param} = {value}: must satisfy {constraint}"
                )
            }
            UmbrafitError::DegenerateInput { message } => {
                write!(f, "Degenerate input: {message}")
            }
            UmbrafitError::Evaluation { message } => {
                write!(f, "Evaluation failed: {message}")
            }
        }
    }
}

impl std::error::Error for UmbrafitError {}

/// Result type alias for umbrafit operations.
pub type Result<T> = std::result::Result<T, UmbrafitError>;
