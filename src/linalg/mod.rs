//! Dense linear solvers for the damped normal equations.
//!
//! Each Levenberg-Marquardt iteration solves
//! `(J^T J + lambda I) dx = -J^T r` for the step `dx`. The solvers here
//! take the Jacobian and residual directly so that a QR backend never has
//! to form `J^T J`.

use faer::Mat;
use std::fmt;
use thiserror::Error;

pub mod cholesky;
pub mod qr;

pub use cholesky::DenseCholeskySolver;
pub use qr::DenseQRSolver;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinAlgError {
    #[error("factorization failed: {0}")]
    FactorizationFailed(String),

    #[error("linear solve produced non-finite values")]
    NonFiniteSolution,

    #[error("dimension mismatch: jacobian has {jacobian_rows} rows, residual has {residual_rows}")]
    DimensionMismatch {
        jacobian_rows: usize,
        residual_rows: usize,
    },
}

pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Strategy used to solve the linear system at each iteration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    /// QR of the stacked system `[J; sqrt(lambda) I]`
    #[default]
    DenseQR,
    /// Cholesky of `J^T J + lambda I`
    DenseNormalCholesky,
}

impl fmt::Display for LinearSolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::DenseQR => write!(f, "DENSE_QR"),
            LinearSolverType::DenseNormalCholesky => write!(f, "DENSE_NORMAL_CHOLESKY"),
        }
    }
}

impl LinearSolverType {
    pub fn create_solver(self) -> Box<dyn DenseLinearSolver> {
        match self {
            LinearSolverType::DenseQR => Box::new(DenseQRSolver::new()),
            LinearSolverType::DenseNormalCholesky => Box::new(DenseCholeskySolver::new()),
        }
    }
}

pub trait DenseLinearSolver: Send {
    /// Solve `(J^T J + lambda I) dx = -J^T r`.
    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &Mat<f64>,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>>;
}

pub(crate) fn check_dimensions(residuals: &Mat<f64>, jacobian: &Mat<f64>) -> LinAlgResult<()> {
    if residuals.nrows() != jacobian.nrows() {
        return Err(LinAlgError::DimensionMismatch {
            jacobian_rows: jacobian.nrows(),
            residual_rows: residuals.nrows(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_finite(solution: Mat<f64>) -> LinAlgResult<Mat<f64>> {
    let finite = (0..solution.ncols())
        .all(|j| (0..solution.nrows()).all(|i| solution[(i, j)].is_finite()));
    if finite {
        Ok(solution)
    } else {
        Err(LinAlgError::NonFiniteSolution)
    }
}
