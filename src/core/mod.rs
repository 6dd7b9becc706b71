//! Core optimization components for the quietsolve library
//!
//! This module contains the building blocks the solver engine works on:
//! - Problem formulation and management
//! - Residual blocks and factors
//! - The [`Optimizable`] capability the engine requires of a problem

use faer::Mat;

use crate::error::SolverResult;

pub mod factors;
pub mod problem;
pub mod residual_block;

/// Residuals (and optionally the Jacobian) of a problem at one state.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Stacked residual vector, `m x 1`
    pub residuals: Mat<f64>,
    /// `m x n` Jacobian with respect to the free parameters
    pub jacobian: Option<Mat<f64>>,
}

impl Evaluation {
    /// Least squares cost `0.5 * ||r||^2`.
    pub fn cost(&self) -> f64 {
        0.5 * (0..self.residuals.nrows())
            .map(|i| self.residuals[(i, 0)] * self.residuals[(i, 0)])
            .sum::<f64>()
    }

    pub fn is_finite(&self) -> bool {
        let finite = |m: &Mat<f64>| {
            (0..m.ncols()).all(|j| (0..m.nrows()).all(|i| m[(i, j)].is_finite()))
        };
        finite(&self.residuals) && self.jacobian.as_ref().is_none_or(finite)
    }
}

/// What the solver engine needs from a problem.
///
/// The state is the flat vector of free (non-constant) parameters. The
/// engine reads it once, iterates on its own copy, and hands the best
/// accepted state back through [`Optimizable::set_state`].
pub trait Optimizable {
    /// Number of stacked residuals.
    fn num_residuals(&self) -> usize;

    /// Number of free scalar parameters, i.e. the length of the state.
    fn num_effective_parameters(&self) -> usize;

    fn state(&self) -> Vec<f64>;

    fn set_state(&mut self, state: &[f64]);

    fn evaluate(&self, state: &[f64], with_jacobian: bool) -> SolverResult<Evaluation>;
}
