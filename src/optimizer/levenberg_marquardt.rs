//! Levenberg-Marquardt algorithm implementation.
//!
//! The Levenberg-Marquardt algorithm interpolates between Gauss-Newton and
//! gradient descent by adding a damping term to the normal equations. The
//! damping acts as an inverse trust-region radius: good steps shrink it,
//! poor steps grow it and are rejected.
//!
//! Residual blocks are evaluated on a dedicated `rayon` pool sized by
//! [`SolverOptions::num_threads`]. Iteration bookkeeping and all logging
//! stay on the calling thread.

use std::time::Instant;

use faer::Mat;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::{Evaluation, Optimizable};
use crate::error::{SolverError, SolverResult};
use crate::optimizer::{LoggingType, OptimizationStatus, SolveSummary, SolverOptions};

/// Levenberg-Marquardt solver for nonlinear least squares optimization.
pub struct LevenbergMarquardt {
    options: SolverOptions,
    damping: f64,
    damping_increase_factor: f64,
    damping_decrease_factor: f64,
    min_step_quality: f64,
    good_step_quality: f64,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt solver with default options.
    pub fn new() -> Self {
        Self::with_options(SolverOptions::default())
    }

    /// Create a new Levenberg-Marquardt solver with the given options.
    pub fn with_options(options: SolverOptions) -> Self {
        Self {
            damping: options.initial_damping,
            options,
            damping_increase_factor: 10.0,
            damping_decrease_factor: 0.3,
            min_step_quality: 1e-3,
            good_step_quality: 0.75,
        }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Update damping parameter based on step quality, returns whether the
    /// step is accepted.
    fn update_damping(&mut self, rho: f64) -> bool {
        if rho > self.good_step_quality {
            self.damping =
                (self.damping * self.damping_decrease_factor).max(self.options.min_damping);
            true
        } else if rho >= self.min_step_quality {
            true
        } else {
            // NaN lands here too
            self.damping =
                (self.damping * self.damping_increase_factor).min(self.options.max_damping);
            false
        }
    }

    /// Compute step quality ratio (actual vs predicted reduction)
    fn compute_step_quality(
        &self,
        current_cost: f64,
        new_cost: f64,
        predicted_reduction: f64,
    ) -> f64 {
        if !new_cost.is_finite() {
            return f64::NEG_INFINITY;
        }
        let actual_reduction = current_cost - new_cost;
        if predicted_reduction.abs() < 1e-15 {
            if actual_reduction > 0.0 { 1.0 } else { 0.0 }
        } else {
            actual_reduction / predicted_reduction
        }
    }

    /// Predicted reduction of the linear model: `-g^T dx - 0.5 ||J dx||^2`
    fn compute_predicted_reduction(
        &self,
        step: &Mat<f64>,
        gradient: &Mat<f64>,
        jacobian: &Mat<f64>,
    ) -> f64 {
        let linear_term: f64 = (0..step.nrows())
            .map(|i| gradient[(i, 0)] * step[(i, 0)])
            .sum();
        let j_step = jacobian.as_ref() * step.as_ref();
        let quadratic_term: f64 = (0..j_step.nrows())
            .map(|i| j_step[(i, 0)] * j_step[(i, 0)])
            .sum();
        -linear_term - 0.5 * quadratic_term
    }

    /// Minimize `problem`, writing the best accepted state back into it.
    pub fn minimize<P>(&mut self, problem: &mut P) -> SolveSummary
    where
        P: Optimizable + Sync + ?Sized,
    {
        let start_time = Instant::now();
        let mut summary = SolveSummary::new(
            &self.options,
            problem.num_residuals(),
            problem.num_effective_parameters(),
        );

        let status = match self.run(problem, &mut summary) {
            Ok(status) => status,
            Err(err) => OptimizationStatus::Failed(err.to_string()),
        };
        summary.status = status;
        summary.final_damping = self.damping;
        summary.total_time = start_time.elapsed();

        self.log_summary(&summary);
        summary
    }

    fn run<P>(
        &mut self,
        problem: &mut P,
        summary: &mut SolveSummary,
    ) -> SolverResult<OptimizationStatus>
    where
        P: Optimizable + Sync + ?Sized,
    {
        self.options.validate()?;
        self.damping = self.options.initial_damping;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads)
            .build()?;
        let mut linear_solver = self.options.linear_solver_type.create_solver();

        let mut params = problem.state();
        let mut evaluation = evaluate_on(&pool, problem, &params, true)?;
        summary.residual_evaluations += 1;
        summary.jacobian_evaluations += 1;
        if !evaluation.is_finite() {
            return Ok(OptimizationStatus::NumericalFailure);
        }

        let mut current_cost = evaluation.cost();
        summary.initial_cost = current_cost;
        summary.final_cost = current_cost;

        if self.options.logging_type == LoggingType::Full {
            tracing::debug!(
                residuals = summary.num_residuals,
                parameters = summary.num_parameters,
                threads = self.options.num_threads,
                linear_solver = %self.options.linear_solver_type,
                max_iterations = self.options.max_iterations,
                initial_cost = current_cost,
                "starting Levenberg-Marquardt"
            );
        }

        let status = loop {
            let Some(jacobian) = evaluation.jacobian.as_ref() else {
                break OptimizationStatus::Failed("jacobian was not evaluated".to_string());
            };
            let residuals = &evaluation.residuals;

            // gradient = J^T * r
            let gradient = jacobian.transpose() * residuals.as_ref();
            let gradient_norm = max_norm(&gradient);
            summary.final_gradient_norm = gradient_norm;

            if gradient_norm <= self.options.gradient_tolerance {
                break OptimizationStatus::GradientToleranceReached;
            }
            if summary.iterations >= self.options.max_iterations {
                break OptimizationStatus::MaxIterationsReached;
            }
            summary.iterations += 1;

            // Solve augmented system: (J^T * J + λI) * dx = -J^T * r
            let step = match linear_solver.solve_augmented_equation(
                residuals,
                jacobian,
                self.damping,
            ) {
                Ok(step) => step,
                Err(err) => break OptimizationStatus::Failed(SolverError::from(err).to_string()),
            };
            let step_norm = step.norm_l2();
            summary.final_step_norm = step_norm;

            let params_norm = params.iter().map(|v| v * v).sum::<f64>().sqrt();
            let ptol = self.options.parameter_tolerance;
            if step_norm <= ptol * (params_norm + ptol) {
                break OptimizationStatus::ParameterToleranceReached;
            }

            let new_params: Vec<f64> = params
                .iter()
                .enumerate()
                .map(|(i, v)| v + step[(i, 0)])
                .collect();
            let new_cost = match evaluate_on(&pool, problem, &new_params, false) {
                Ok(trial) => trial.cost(),
                Err(err) => break OptimizationStatus::Failed(err.to_string()),
            };
            summary.residual_evaluations += 1;

            let predicted_reduction = self.compute_predicted_reduction(&step, &gradient, jacobian);
            let rho = self.compute_step_quality(current_cost, new_cost, predicted_reduction);

            if !self.update_damping(rho) {
                summary.unsuccessful_steps += 1;
                self.log_iteration(
                    summary.iterations,
                    current_cost,
                    0.0,
                    gradient_norm,
                    step_norm,
                    rho,
                    false,
                );
                continue;
            }

            let cost_change = current_cost - new_cost;
            let previous_cost = current_cost;
            params = new_params;
            current_cost = new_cost;
            summary.final_cost = current_cost;
            summary.successful_steps += 1;
            self.log_iteration(
                summary.iterations,
                current_cost,
                cost_change,
                gradient_norm,
                step_norm,
                rho,
                true,
            );

            evaluation = match evaluate_on(&pool, problem, &params, true) {
                Ok(evaluation) => evaluation,
                Err(err) => break OptimizationStatus::Failed(err.to_string()),
            };
            summary.residual_evaluations += 1;
            summary.jacobian_evaluations += 1;
            if !evaluation.is_finite() {
                break OptimizationStatus::NumericalFailure;
            }

            if cost_change.abs() <= self.options.function_tolerance * previous_cost {
                break OptimizationStatus::FunctionToleranceReached;
            }
        };

        problem.set_state(&params);
        Ok(status)
    }

    #[allow(clippy::too_many_arguments)]
    fn log_iteration(
        &self,
        iteration: usize,
        cost: f64,
        cost_change: f64,
        gradient_norm: f64,
        step_norm: f64,
        rho: f64,
        accepted: bool,
    ) {
        if self.options.logging_type == LoggingType::Full {
            tracing::debug!(
                iteration,
                cost,
                cost_change,
                gradient_norm,
                step_norm,
                damping = self.damping,
                rho,
                accepted,
                "Levenberg-Marquardt iteration"
            );
        }
        if self.options.minimizer_progress_to_stdout {
            println!(
                "{:4}: cost = {:.6e}, cost_change = {:.3e}, |gradient| = {:.3e}, |step| = {:.3e}, damping = {:.3e}, rho = {:.3} [{}]",
                iteration,
                cost,
                cost_change,
                gradient_norm,
                step_norm,
                self.damping,
                rho,
                if accepted { "ACCEPTED" } else { "REJECTED" }
            );
        }
    }

    fn log_summary(&self, summary: &SolveSummary) {
        match self.options.logging_type {
            LoggingType::Silent => {}
            LoggingType::Summary => tracing::info!("{}", summary.brief_report()),
            LoggingType::Full => tracing::info!("\n{summary}"),
        }
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

fn evaluate_on<P>(
    pool: &ThreadPool,
    problem: &P,
    state: &[f64],
    with_jacobian: bool,
) -> SolverResult<Evaluation>
where
    P: Optimizable + Sync + ?Sized,
{
    pool.install(|| problem.evaluate(state, with_jacobian))
}

fn max_norm(vector: &Mat<f64>) -> f64 {
    (0..vector.nrows()).map(|i| vector[(i, 0)].abs()).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::factors::{ClosureFactor, PriorFactor};
    use crate::core::problem::Problem;
    use crate::linalg::LinearSolverType;

    /// Rosenbrock as least squares: r = [a - x, sqrt(b) (y - x^2)]
    fn rosenbrock_problem(a: f64, b: f64) -> (Problem, crate::core::problem::ParameterBlockId) {
        let mut problem = Problem::new();
        let xy = problem.add_parameter_block(&[-1.2, 1.0]).unwrap();
        let sb = b.sqrt();
        let factor = ClosureFactor::new(
            2,
            move |p: &[f64], r: &mut [f64], j: Option<&mut [f64]>| {
                r[0] = a - p[0];
                r[1] = sb * (p[1] - p[0] * p[0]);
                if let Some(j) = j {
                    j.copy_from_slice(&[-1.0, 0.0, -2.0 * sb * p[0], sb]);
                }
            },
        );
        problem.add_residual_block(factor, &[xy]).unwrap();
        (problem, xy)
    }

    #[test]
    fn test_levenberg_marquardt_creation() {
        let solver = LevenbergMarquardt::new();
        assert!(solver.damping > 0.0);
        assert_eq!(solver.options().linear_solver_type, LinearSolverType::DenseQR);
    }

    #[test]
    fn test_update_damping() {
        let mut solver = LevenbergMarquardt::new();
        let initial = solver.damping;

        assert!(solver.update_damping(0.9));
        assert!(solver.damping < initial);

        let after_good = solver.damping;
        assert!(solver.update_damping(0.5));
        assert_eq!(solver.damping, after_good);

        assert!(!solver.update_damping(-1.0));
        assert!(solver.damping > after_good);

        assert!(!solver.update_damping(f64::NAN));
    }

    #[test]
    fn test_step_quality_non_finite_cost() {
        let solver = LevenbergMarquardt::new();
        assert_eq!(
            solver.compute_step_quality(1.0, f64::NAN, 0.5),
            f64::NEG_INFINITY
        );
        assert_eq!(solver.compute_step_quality(1.0, 0.5, 0.5), 1.0);
    }

    #[test]
    fn test_rosenbrock_optimization() {
        for linear_solver_type in [
            LinearSolverType::DenseQR,
            LinearSolverType::DenseNormalCholesky,
        ] {
            let (mut problem, xy) = rosenbrock_problem(1.0, 100.0);
            let options = SolverOptions::new()
                .with_max_iterations(200)
                .with_function_tolerance(1e-14)
                .with_gradient_tolerance(1e-12)
                .with_linear_solver_type(linear_solver_type)
                .with_logging_type(LoggingType::Silent);

            let summary = LevenbergMarquardt::with_options(options).minimize(&mut problem);
            let p = problem.parameter_block(xy).unwrap();

            assert!(summary.is_converged(), "{linear_solver_type}: {}", summary.status);
            assert!((p[0] - 1.0).abs() < 1e-5, "x = {}", p[0]);
            assert!((p[1] - 1.0).abs() < 1e-5, "y = {}", p[1]);
            assert!(summary.final_cost < summary.initial_cost);
        }
    }

    #[test]
    fn test_progress_to_stdout_converges() {
        let (mut problem, xy) = rosenbrock_problem(1.0, 100.0);
        let options = SolverOptions::new()
            .with_max_iterations(200)
            .with_function_tolerance(1e-14)
            .with_gradient_tolerance(1e-12)
            .with_logging_type(LoggingType::Silent)
            .with_minimizer_progress_to_stdout(true);
        assert!(options.minimizer_progress_to_stdout);

        let summary = solve_with(&options, &mut problem);
        let p = problem.parameter_block(xy).unwrap();

        assert!(summary.is_converged(), "{}", summary.status);
        assert!(summary.iterations > 0);
        assert!((p[0] - 1.0).abs() < 1e-5, "x = {}", p[0]);
        assert!((p[1] - 1.0).abs() < 1e-5, "y = {}", p[1]);
    }

    #[test]
    fn test_invalid_options_leave_problem_untouched() {
        let mut problem = Problem::new();
        let x = problem.add_parameter_block(&[3.0]).unwrap();
        problem.add_residual_block(PriorFactor::new(&[0.0]), &[x]).unwrap();

        let options = SolverOptions::new()
            .with_num_threads(0)
            .with_logging_type(LoggingType::Silent);
        let summary = solve_with(&options, &mut problem);

        assert!(matches!(summary.status, OptimizationStatus::Failed(_)));
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.residual_evaluations, 0);
        assert_eq!(problem.parameter_block(x), Some(&[3.0][..]));
    }

    #[test]
    fn test_non_finite_initial_residual() {
        let mut problem = Problem::new();
        let x = problem.add_parameter_block(&[1.0]).unwrap();
        let factor = ClosureFactor::new(1, |_: &[f64], r: &mut [f64], _: Option<&mut [f64]>| {
            r[0] = f64::NAN;
        });
        problem.add_residual_block(factor, &[x]).unwrap();

        let options = SolverOptions::new().with_logging_type(LoggingType::Silent);
        let summary = solve_with(&options, &mut problem);
        assert_eq!(summary.status, OptimizationStatus::NumericalFailure);
        assert_eq!(problem.parameter_block(x), Some(&[1.0][..]));
    }

    #[test]
    fn test_constant_block_is_not_moved() {
        let mut problem = Problem::new();
        let x = problem.add_parameter_block(&[5.0]).unwrap();
        let y = problem.add_parameter_block(&[7.0]).unwrap();
        problem.add_residual_block(PriorFactor::new(&[1.0]), &[x]).unwrap();
        problem.add_residual_block(PriorFactor::new(&[2.0]), &[y]).unwrap();
        problem.set_parameter_block_constant(y).unwrap();

        let options = SolverOptions::new().with_logging_type(LoggingType::Silent);
        let summary = solve_with(&options, &mut problem);

        assert!(summary.is_converged());
        assert_eq!(summary.num_parameters, 1);
        assert!((problem.parameter_block(x).unwrap()[0] - 1.0).abs() < 1e-6);
        assert_eq!(problem.parameter_block(y), Some(&[7.0][..]));
        // the constant block keeps contributing its residual
        assert!((summary.final_cost - 12.5).abs() < 1e-8);
    }

    fn solve_with(options: &SolverOptions, problem: &mut Problem) -> SolveSummary {
        crate::optimizer::solve(options, problem)
    }
}
