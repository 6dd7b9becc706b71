use std::fmt;
use std::time::Duration;

use crate::linalg::LinearSolverType;
use crate::optimizer::{OptimizationStatus, SolverOptions};

/// What a solve did and how it ended.
///
/// Costs are `0.5 * ||r||^2`. When the solve fails before the first
/// evaluation (for example because the options were rejected) both costs
/// are NaN and the problem was not touched.
#[derive(Debug, Clone)]
pub struct SolveSummary {
    pub status: OptimizationStatus,
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Iterations performed, rejected steps included
    pub iterations: usize,
    pub successful_steps: usize,
    pub unsuccessful_steps: usize,
    /// Max-norm of `J^T r` at the final point
    pub final_gradient_norm: f64,
    /// L2 norm of the last computed step
    pub final_step_norm: f64,
    pub final_damping: f64,
    pub residual_evaluations: usize,
    pub jacobian_evaluations: usize,
    pub num_residuals: usize,
    pub num_parameters: usize,
    pub num_threads: usize,
    pub linear_solver_type: LinearSolverType,
    pub total_time: Duration,
}

impl SolveSummary {
    pub(crate) fn new(
        options: &SolverOptions,
        num_residuals: usize,
        num_parameters: usize,
    ) -> Self {
        Self {
            status: OptimizationStatus::Failed("solve did not run".to_string()),
            initial_cost: f64::NAN,
            final_cost: f64::NAN,
            iterations: 0,
            successful_steps: 0,
            unsuccessful_steps: 0,
            final_gradient_norm: f64::NAN,
            final_step_norm: 0.0,
            final_damping: options.initial_damping,
            residual_evaluations: 0,
            jacobian_evaluations: 0,
            num_residuals,
            num_parameters,
            num_threads: options.num_threads,
            linear_solver_type: options.linear_solver_type,
            total_time: Duration::ZERO,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Whether the parameters left in the problem are worth using: the
    /// solve converged or ran out of iterations on finite values.
    pub fn is_solution_usable(&self) -> bool {
        self.is_converged()
            || (self.status == OptimizationStatus::MaxIterationsReached
                && self.final_cost.is_finite())
    }

    /// One-line report.
    pub fn brief_report(&self) -> String {
        format!(
            "Levenberg-Marquardt: {}, iterations: {}, initial cost: {:.6e}, final cost: {:.6e}",
            self.status, self.iterations, self.initial_cost, self.final_cost
        )
    }

    /// Multi-line report, identical to the `Display` output.
    pub fn full_report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SolveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Levenberg-Marquardt Solve Summary ===")?;
        writeln!(f, "Residuals:                 {}", self.num_residuals)?;
        writeln!(f, "Parameters:                {}", self.num_parameters)?;
        writeln!(f, "Linear solver:             {}", self.linear_solver_type)?;
        writeln!(f, "Threads:                   {}", self.num_threads)?;
        writeln!(f, "Initial cost:              {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:                {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "Cost reduction:            {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.max(1e-12)
        )?;
        writeln!(f, "Total iterations:          {}", self.iterations)?;
        writeln!(
            f,
            "Successful steps:          {} ({:.1}%)",
            self.successful_steps,
            100.0 * self.successful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(
            f,
            "Unsuccessful steps:        {} ({:.1}%)",
            self.unsuccessful_steps,
            100.0 * self.unsuccessful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(f, "Final damping parameter:   {:.6e}", self.final_damping)?;
        writeln!(f, "Final gradient norm:       {:.6e}", self.final_gradient_norm)?;
        writeln!(f, "Final step norm:           {:.6e}", self.final_step_norm)?;
        writeln!(f, "Residual evaluations:      {}", self.residual_evaluations)?;
        writeln!(f, "Jacobian evaluations:      {}", self.jacobian_evaluations)?;
        writeln!(f, "Total time:                {:?}", self.total_time)?;
        writeln!(f, "Termination:               {}", self.status)?;
        Ok(())
    }
}
