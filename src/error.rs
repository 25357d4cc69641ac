//! Error type shared by the delayed rejection stages and the reference sampler.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrError {
    /// Two arrays that must be aligned have different lengths.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A stage factor is not a square matrix.
    #[error("stage {stage} factor is not square ({rows}x{cols})")]
    NotSquare {
        stage: usize,
        rows: usize,
        cols: usize,
    },

    /// A stage factor has non-zero entries below its diagonal.
    #[error("stage {stage} factor is not upper triangular")]
    NotUpperTriangular { stage: usize },

    /// A stage factor has a zero, negative or non-finite diagonal entry.
    #[error("stage {stage} factor is singular at diagonal index {index} (value {value})")]
    SingularFactor {
        stage: usize,
        index: usize,
        value: f64,
    },

    /// A stage factor contains NaN or infinite entries.
    #[error("stage {stage} factor contains non-finite entries")]
    NonFinite { stage: usize },

    /// A covariance matrix could not be factorized.
    #[error("covariance matrix is not positive definite")]
    NotPositiveDefinite,

    /// No stage factors were supplied.
    #[error("at least one stage factor is required")]
    NoStages,

    /// A configuration value is out of range.
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, DrError>;
