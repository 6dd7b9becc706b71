//! Closure-level entry points.
//!
//! These wrap the solver engine for callers that have a residual function
//! over a flat parameter vector rather than a [`Problem`](crate::core::problem::Problem).
//! Both stay silent unless asked to report.

mod residual_fn;
mod residual_solver;

pub use residual_fn::{DifferentiableResidualFn, ResidualFn};
pub use residual_solver::{LevenbergMarquardtMinimizer, ResidualSolver};

/// Minimizes a cost function from a starting point.
pub trait Minimizer {
    type CostFunctionTy: ResidualFn;

    fn minimize(&self, cost_fn: Self::CostFunctionTy, x0: Vec<f64>) -> Vec<f64>;
}
