//! The solver engine: options in, summary out.
//!
//! [`solve`] runs a dense Levenberg-Marquardt trust-region minimization on
//! anything implementing [`Optimizable`]. It never panics and never returns
//! an error: every outcome, including rejected options, is reported through
//! the [`SolveSummary`] status.

use std::fmt;

use crate::core::Optimizable;
use crate::error::{SolverError, SolverResult};
use crate::linalg::LinearSolverType;

pub mod levenberg_marquardt;
pub mod summary;

pub use levenberg_marquardt::LevenbergMarquardt;
pub use summary::SolveSummary;

/// How much the engine reports through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingType {
    /// No events at all
    Silent,
    /// One `info` event with the brief report when the solve ends
    Summary,
    /// A `debug` event per iteration plus the full report at `info`
    Full,
}

impl fmt::Display for LoggingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingType::Silent => write!(f, "SILENT"),
            LoggingType::Summary => write!(f, "SUMMARY"),
            LoggingType::Full => write!(f, "FULL"),
        }
    }
}

/// Status of an optimization process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// Relative cost change fell below the function tolerance
    FunctionToleranceReached,
    /// Gradient max-norm fell below the gradient tolerance
    GradientToleranceReached,
    /// Step became negligible relative to the parameters
    ParameterToleranceReached,
    /// Iteration budget spent before any tolerance was met
    MaxIterationsReached,
    /// Residuals or Jacobian evaluated to NaN or infinity
    NumericalFailure,
    /// The solve could not run or was aborted
    Failed(String),
}

impl OptimizationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            OptimizationStatus::FunctionToleranceReached
                | OptimizationStatus::GradientToleranceReached
                | OptimizationStatus::ParameterToleranceReached
        )
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::FunctionToleranceReached => write!(f, "Function tolerance reached"),
            OptimizationStatus::GradientToleranceReached => write!(f, "Gradient tolerance reached"),
            OptimizationStatus::ParameterToleranceReached => {
                write!(f, "Parameter tolerance reached")
            }
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::NumericalFailure => write!(f, "Numerical failure"),
            OptimizationStatus::Failed(msg) => write!(f, "Failed: {msg}"),
        }
    }
}

/// Configuration parameters for the solver engine.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of iterations, accepted and rejected steps alike
    pub max_iterations: usize,
    /// Worker threads used to evaluate residual blocks
    pub num_threads: usize,
    /// Stop when `|cost change| <= function_tolerance * cost`
    pub function_tolerance: f64,
    /// Stop when `max |J^T r| <= gradient_tolerance`
    pub gradient_tolerance: f64,
    /// Stop when `||dx|| <= parameter_tolerance * (||x|| + parameter_tolerance)`
    pub parameter_tolerance: f64,
    /// Linear solver for the damped normal equations
    pub linear_solver_type: LinearSolverType,
    /// What the engine reports through `tracing`
    pub logging_type: LoggingType,
    /// Print one progress line per iteration to stdout
    pub minimizer_progress_to_stdout: bool,
    /// Initial Levenberg-Marquardt damping
    pub initial_damping: f64,
    pub min_damping: f64,
    pub max_damping: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            num_threads: 1,
            function_tolerance: 1e-6,
            gradient_tolerance: 1e-10,
            parameter_tolerance: 1e-8,
            linear_solver_type: LinearSolverType::default(),
            logging_type: LoggingType::Full,
            minimizer_progress_to_stdout: false,
            initial_damping: 1e-4,
            min_damping: 1e-12,
            max_damping: 1e12,
        }
    }
}

impl SolverOptions {
    /// Create a new options record with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
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

    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_logging_type(mut self, logging_type: LoggingType) -> Self {
        self.logging_type = logging_type;
        self
    }

    pub fn with_minimizer_progress_to_stdout(mut self, enabled: bool) -> Self {
        self.minimizer_progress_to_stdout = enabled;
        self
    }

    /// Set the initial damping and its bounds.
    pub fn with_damping(mut self, initial: f64, min: f64, max: f64) -> Self {
        self.initial_damping = initial;
        self.min_damping = min;
        self.max_damping = max;
        self
    }

    /// Reject options the engine cannot run with.
    ///
    /// Tolerances of exactly zero are valid; they just disable that
    /// stopping rule in practice.
    pub fn validate(&self) -> SolverResult<()> {
        if self.num_threads == 0 {
            return Err(SolverError::InvalidOptions(
                "num_threads must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("function_tolerance", self.function_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(SolverError::InvalidOptions(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        let damping_ok = self.min_damping > 0.0
            && self.min_damping <= self.initial_damping
            && self.initial_damping <= self.max_damping
            && self.max_damping.is_finite();
        if !damping_ok {
            return Err(SolverError::InvalidOptions(format!(
                "damping must satisfy 0 < min <= initial <= max < inf, got {} <= {} <= {}",
                self.min_damping, self.initial_damping, self.max_damping
            )));
        }
        Ok(())
    }
}

/// Minimize `problem` with `options`, updating its parameters in place.
pub fn solve<P>(options: &SolverOptions, problem: &mut P) -> SolveSummary
where
    P: Optimizable + Sync + ?Sized,
{
    LevenbergMarquardt::with_options(options.clone()).minimize(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        let options = SolverOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.linear_solver_type, LinearSolverType::DenseQR);
        assert_eq!(options.logging_type, LoggingType::Full);
        assert!(!options.minimizer_progress_to_stdout);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let options = SolverOptions::new().with_num_threads(0);
        assert!(matches!(
            options.validate(),
            Err(SolverError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_negative_and_nan_tolerances_rejected() {
        assert!(
            SolverOptions::new()
                .with_function_tolerance(-1e-6)
                .validate()
                .is_err()
        );
        assert!(
            SolverOptions::new()
                .with_gradient_tolerance(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_zero_tolerances_accepted() {
        let options = SolverOptions::new()
            .with_function_tolerance(0.0)
            .with_gradient_tolerance(0.0)
            .with_parameter_tolerance(0.0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_status_convergence() {
        assert!(OptimizationStatus::GradientToleranceReached.is_converged());
        assert!(!OptimizationStatus::MaxIterationsReached.is_converged());
        assert!(!OptimizationStatus::Failed("x".to_string()).is_converged());
    }
}
