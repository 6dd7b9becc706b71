//! Quiet solve facade.
//!
//! [`solve_silent`] is the embedding entry point: it takes an already built
//! [`Problem`], an iteration budget, a thread count and two convergence
//! tolerances, and runs the engine with dense QR, silent logging and no
//! console progress. Those three settings are fixed and cannot be changed
//! through the facade.
//!
//! The caller's values are forwarded as given. Anything the engine rejects
//! (zero threads, negative or NaN tolerances) comes back as a
//! [`OptimizationStatus::Failed`](crate::optimizer::OptimizationStatus::Failed)
//! status with the problem untouched.
//!
//! # Example
//!
//! ```
//! use quietsolve::core::factors::PriorFactor;
//! use quietsolve::core::problem::Problem;
//! use quietsolve::quiet::solve_silent;
//!
//! let mut problem = Problem::new();
//! let x = problem.add_parameter_block(&[0.0, 0.0]).unwrap();
//! problem
//!     .add_residual_block(PriorFactor::new(&[1.0, -2.0]), &[x])
//!     .unwrap();
//!
//! let summary = solve_silent(&mut problem, 50, 1, 1e-10, 1e-12);
//! assert!(summary.is_converged());
//!
//! let values = problem.parameter_block(x).unwrap();
//! assert!((values[0] - 1.0).abs() < 1e-6);
//! assert!((values[1] + 2.0).abs() < 1e-6);
//! ```

use crate::core::Optimizable;
use crate::core::problem::Problem;
use crate::linalg::LinearSolverType;
use crate::optimizer::{self, LoggingType, SolveSummary, SolverOptions};

/// Options the facade hands to the engine.
///
/// The four caller values are copied verbatim. Linear solver, logging and
/// console progress are always dense QR, silent and off.
pub fn silent_options(
    max_iterations: usize,
    num_threads: usize,
    function_tolerance: f64,
    gradient_tolerance: f64,
) -> SolverOptions {
    SolverOptions::new()
        .with_max_iterations(max_iterations)
        .with_num_threads(num_threads)
        .with_function_tolerance(function_tolerance)
        .with_gradient_tolerance(gradient_tolerance)
        .with_linear_solver_type(LinearSolverType::DenseQR)
        .with_logging_type(LoggingType::Silent)
        .with_minimizer_progress_to_stdout(false)
}

/// Minimize `problem` in place without emitting any output.
///
/// Blocks the calling thread until the engine stops. The returned summary
/// can be dropped by callers that only inspect the parameters afterwards.
pub fn solve_silent(
    problem: &mut Problem,
    max_iterations: usize,
    num_threads: usize,
    function_tolerance: f64,
    gradient_tolerance: f64,
) -> SolveSummary {
    let options = silent_options(
        max_iterations,
        num_threads,
        function_tolerance,
        gradient_tolerance,
    );
    optimizer::solve(&options, problem)
}

/// Reusable facade configuration.
///
/// Same policy as [`solve_silent`] except that the logging level is a
/// setting. It defaults to [`LoggingType::Silent`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuietConfig {
    pub logging: LoggingType,
    pub thread_count: usize,
    pub max_iterations: usize,
    pub function_tolerance: f64,
    pub gradient_tolerance: f64,
}

impl Default for QuietConfig {
    fn default() -> Self {
        let defaults = SolverOptions::default();
        Self {
            logging: LoggingType::Silent,
            thread_count: defaults.num_threads,
            max_iterations: defaults.max_iterations,
            function_tolerance: defaults.function_tolerance,
            gradient_tolerance: defaults.gradient_tolerance,
        }
    }
}

impl QuietConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logging(mut self, logging: LoggingType) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_function_tolerance(mut self, function_tolerance: f64) -> Self {
        self.function_tolerance = function_tolerance;
        self
    }

    pub fn with_gradient_tolerance(mut self, gradient_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    /// Engine options for this configuration.
    pub fn to_options(&self) -> SolverOptions {
        silent_options(
            self.max_iterations,
            self.thread_count,
            self.function_tolerance,
            self.gradient_tolerance,
        )
        .with_logging_type(self.logging)
    }

    /// Minimize `problem` in place.
    ///
    /// The borrow lasts for the call only; nothing keeps a reference to the
    /// problem once this returns.
    pub fn solve<P>(&self, problem: &mut P) -> SolveSummary
    where
        P: Optimizable + Sync + ?Sized,
    {
        optimizer::solve(&self.to_options(), problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::factors::PriorFactor;
    use crate::optimizer::OptimizationStatus;

    fn prior_problem(start: &[f64], target: &[f64]) -> Problem {
        let mut problem = Problem::new();
        let id = problem.add_parameter_block(start).unwrap();
        problem
            .add_residual_block(PriorFactor::new(target), &[id])
            .unwrap();
        problem
    }

    #[test]
    fn test_silent_options_forward_caller_values() {
        let options = silent_options(7, 3, 1e-4, 1e-9);
        assert_eq!(options.max_iterations, 7);
        assert_eq!(options.num_threads, 3);
        assert_eq!(options.function_tolerance, 1e-4);
        assert_eq!(options.gradient_tolerance, 1e-9);
    }

    #[test]
    fn test_silent_options_fixed_policy() {
        let options = silent_options(1, 1, 0.0, 0.0);
        assert_eq!(options.linear_solver_type, LinearSolverType::DenseQR);
        assert_eq!(options.logging_type, LoggingType::Silent);
        assert!(!options.minimizer_progress_to_stdout);
    }

    #[test]
    fn test_silent_options_do_not_validate_inputs() {
        let options = silent_options(0, 0, -1.0, f64::NAN);
        assert_eq!(options.num_threads, 0);
        assert_eq!(options.function_tolerance, -1.0);
        assert!(options.gradient_tolerance.is_nan());
    }

    #[test]
    fn test_solve_silent_reaches_prior() {
        let mut problem = prior_problem(&[5.0, -5.0], &[1.0, 2.0]);
        let summary = solve_silent(&mut problem, 50, 1, 1e-10, 1e-12);

        assert!(summary.is_converged());
        assert_eq!(summary.linear_solver_type, LinearSolverType::DenseQR);
        assert!(summary.final_cost < 1e-12);
    }

    #[test]
    fn test_solve_silent_zero_threads_fails_without_touching_problem() {
        let mut problem = Problem::new();
        let id = problem.add_parameter_block(&[5.0]).unwrap();
        problem
            .add_residual_block(PriorFactor::new(&[1.0]), &[id])
            .unwrap();
        let summary = solve_silent(&mut problem, 50, 0, 1e-6, 1e-10);

        assert!(matches!(summary.status, OptimizationStatus::Failed(_)));
        assert_eq!(summary.iterations, 0);
        assert_eq!(problem.parameter_block(id), Some(&[5.0][..]));
    }

    #[test]
    fn test_quiet_config_default_is_silent() {
        let config = QuietConfig::default();
        assert_eq!(config.logging, LoggingType::Silent);

        let options = config.to_options();
        assert_eq!(options.logging_type, LoggingType::Silent);
        assert_eq!(options.linear_solver_type, LinearSolverType::DenseQR);
        assert!(!options.minimizer_progress_to_stdout);
    }

    #[test]
    fn test_quiet_config_logging_does_not_change_policy() {
        let options = QuietConfig::new()
            .with_logging(LoggingType::Full)
            .with_thread_count(2)
            .with_max_iterations(12)
            .to_options();

        assert_eq!(options.logging_type, LoggingType::Full);
        assert_eq!(options.num_threads, 2);
        assert_eq!(options.max_iterations, 12);
        assert_eq!(options.linear_solver_type, LinearSolverType::DenseQR);
        assert!(!options.minimizer_progress_to_stdout);
    }

    #[test]
    fn test_quiet_config_solve() {
        let mut problem = prior_problem(&[0.0], &[-3.0]);
        let summary = QuietConfig::new()
            .with_function_tolerance(1e-12)
            .solve(&mut problem);
        assert!(summary.is_converged());
    }
}
