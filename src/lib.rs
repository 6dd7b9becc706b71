//! # Quietsolve
//!
//! A small nonlinear least squares library built around one idea: a solver
//! embedded in a larger system should not talk unless asked to.
//!
//! ## Features
//!
//! - **Quiet Facade**: [`solve_silent`] runs a bounded Levenberg-Marquardt minimization with
//!   dense QR and no log or console output
//! - **Typed Problems**: parameter blocks and residual blocks behind a [`Problem`], handed to
//!   the engine as an exclusive borrow for the duration of the call
//! - **Structured Results**: every solve returns a [`SolveSummary`] with status, costs and
//!   iteration counts instead of failing silently
//! - **Parallel Evaluation**: residual blocks are evaluated on a `rayon` pool sized by the
//!   caller's thread count
//! - **Closure Minimizers**: [`ResidualSolver`] and [`LevenbergMarquardtMinimizer`] for
//!   residual functions over a flat parameter vector
//!
//! ## Linear Algebra Backends
//!
//! - **Dense QR**: solves the stacked damped system directly, the facade's fixed choice
//! - **Dense Cholesky**: factors the damped normal equations, available to the engine

// Local modules
pub mod core;
pub mod error;
pub mod linalg;
pub mod logger;
pub mod minimizers;
pub mod optimizer;
pub mod quiet;

// Re-export core types
pub use crate::core::Optimizable;
pub use crate::core::factors::{ClosureFactor, Factor, PriorFactor};
pub use crate::core::problem::{ParameterBlockId, Problem, ProblemError, ResidualBlockId};
pub use error::{SolverError, SolverResult};

// Re-export linear algebra types
pub use linalg::{DenseCholeskySolver, DenseLinearSolver, DenseQRSolver, LinearSolverType};

// Re-export optimizer types
pub use optimizer::{
    LevenbergMarquardt, LoggingType, OptimizationStatus, SolveSummary, SolverOptions,
};

// Re-export the facade and closure-level entry points
pub use minimizers::{
    DifferentiableResidualFn, LevenbergMarquardtMinimizer, Minimizer, ResidualFn, ResidualSolver,
};
pub use quiet::{QuietConfig, silent_options, solve_silent};

pub use logger::{init_logger, init_logger_with_level};
