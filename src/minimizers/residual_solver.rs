//! Least squares over a single residual callback.

use std::sync::{Mutex, PoisonError};

use faer::Mat;

use crate::core::factors::eval_residual_callback;
use crate::core::{Evaluation, Optimizable};
use crate::error::{SolverError, SolverResult};
use crate::minimizers::{DifferentiableResidualFn, Minimizer};
use crate::optimizer::{LoggingType, SolveSummary};
use crate::quiet::QuietConfig;

/// Solves `min 0.5 * ||f(x)||^2` for a residual closure `f`.
///
/// The closure has the shape `f(params, residuals, jacobian)`: it fills
/// `residuals` and, when `jacobian` is `Some`, the row-major
/// `num_residuals x params.len()` Jacobian.
#[derive(Debug, Clone)]
pub struct ResidualSolver {
    num_threads: usize,
    ftol: f64,
    gtol: f64,
    report: bool,
}

impl ResidualSolver {
    /// With `report` set, the engine logs its full report through `tracing`
    /// instead of staying silent.
    pub fn new(num_threads: usize, ftol: f64, gtol: f64, report: bool) -> Self {
        Self {
            num_threads,
            ftol,
            gtol,
            report,
        }
    }

    fn config(&self, max_iters: usize) -> QuietConfig {
        let logging = if self.report {
            LoggingType::Full
        } else {
            LoggingType::Silent
        };
        QuietConfig::new()
            .with_logging(logging)
            .with_thread_count(self.num_threads)
            .with_max_iterations(max_iters)
            .with_function_tolerance(self.ftol)
            .with_gradient_tolerance(self.gtol)
    }

    /// Minimize starting from `x0`, which receives the result.
    pub fn solve<R>(
        &self,
        residual_function: &mut R,
        x0: &mut [f64],
        num_residuals: usize,
        max_iters: usize,
    ) -> SolveSummary
    where
        R: FnMut(&[f64], &mut [f64], Option<&mut [f64]>) + Send,
    {
        let mut problem = ClosureProblem {
            callback: Mutex::new(residual_function),
            values: x0.to_vec(),
            num_residuals,
        };
        let summary = self.config(max_iters).solve(&mut problem);
        x0.copy_from_slice(&problem.values);
        summary
    }
}

/// One parameter block, one residual block, no ownership of the callback.
struct ClosureProblem<'a, R> {
    callback: Mutex<&'a mut R>,
    values: Vec<f64>,
    num_residuals: usize,
}

impl<R> Optimizable for ClosureProblem<'_, R>
where
    R: FnMut(&[f64], &mut [f64], Option<&mut [f64]>) + Send,
{
    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn num_effective_parameters(&self) -> usize {
        self.values.len()
    }

    fn state(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn set_state(&mut self, state: &[f64]) {
        self.values.copy_from_slice(state);
    }

    fn evaluate(&self, state: &[f64], with_jacobian: bool) -> SolverResult<Evaluation> {
        if state.len() != self.values.len() {
            return Err(SolverError::Problem(format!(
                "state has {} values, expected {}",
                state.len(),
                self.values.len()
            )));
        }
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        let (residual, jacobian) =
            eval_residual_callback(&mut **callback, state, self.num_residuals, with_jacobian);

        Ok(Evaluation {
            residuals: Mat::from_fn(residual.nrows(), 1, |i, _| residual[i]),
            jacobian: jacobian
                .map(|jac| Mat::from_fn(jac.nrows(), jac.ncols(), |i, j| jac[(i, j)])),
        })
    }
}

/// [`Minimizer`] over a [`DifferentiableResidualFn`], backed by
/// [`ResidualSolver`] with an iteration budget of `100 * x0.len()`.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtMinimizer {
    solver: ResidualSolver,
}

impl LevenbergMarquardtMinimizer {
    pub fn new(num_threads: usize, ftol: f64, gtol: f64) -> Self {
        Self {
            solver: ResidualSolver::new(num_threads, ftol, gtol, false),
        }
    }

    /// Same as [`Minimizer::minimize`] but keeps the solve summary.
    pub fn minimize_with_summary<F>(
        &self,
        cost_fn: &F,
        x0: Vec<f64>,
    ) -> (Vec<f64>, SolveSummary)
    where
        F: DifferentiableResidualFn + Sync + ?Sized,
    {
        let num_params = x0.len();
        let mut residual_fn = |params: &[f64], resids: &mut [f64], jac: Option<&mut [f64]>| {
            match jac {
                Some(jacobian) => {
                    let (res, grad) = cost_fn.get_residuals_and_grad(params);
                    resids.copy_from_slice(&res);
                    for i in 0..grad.nrows() {
                        for j in 0..grad.ncols() {
                            jacobian[i * num_params + j] = grad[(i, j)];
                        }
                    }
                }
                None => resids.copy_from_slice(&cost_fn.get_residuals(params)),
            }
        };
        let mut x = x0;
        let summary = self.solver.solve(
            &mut residual_fn,
            &mut x,
            cost_fn.num_residuals(),
            100 * num_params,
        );
        (x, summary)
    }
}

impl Minimizer for LevenbergMarquardtMinimizer {
    type CostFunctionTy = Box<dyn DifferentiableResidualFn + Send + Sync>;

    fn minimize(&self, cost_fn: Self::CostFunctionTy, x0: Vec<f64>) -> Vec<f64> {
        self.minimize_with_summary(cost_fn.as_ref(), x0).0
    }
}
