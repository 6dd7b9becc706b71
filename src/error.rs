//! Error types for the quietsolve library
//!
//! Module-level errors ([`ProblemError`], [`LinAlgError`]) convert into the
//! crate-wide [`SolverError`] so callers can propagate everything with `?`.
//! All errors use the `thiserror` crate for automatic trait implementations.

use crate::{core::problem::ProblemError, linalg::LinAlgError};
use rayon::ThreadPoolBuildError;
use thiserror::Error;

/// Main result type used throughout the quietsolve library
pub type SolverResult<T> = Result<T, SolverError>;

/// Main error type for the quietsolve library
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// Solver options rejected before any work was done
    #[error("Invalid solver options: {0}")]
    InvalidOptions(String),

    /// Problem construction or layout errors
    #[error("Problem error: {0}")]
    Problem(String),

    /// Linear algebra related errors
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Residual or Jacobian evaluation produced unusable values
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl From<ProblemError> for SolverError {
    fn from(err: ProblemError) -> Self {
        SolverError::Problem(err.to_string())
    }
}

impl From<LinAlgError> for SolverError {
    fn from(err: LinAlgError) -> Self {
        SolverError::LinearAlgebra(err.to_string())
    }
}

impl From<ThreadPoolBuildError> for SolverError {
    fn from(err: ThreadPoolBuildError) -> Self {
        SolverError::ThreadPool(err.to_string())
    }
}
