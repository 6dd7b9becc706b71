//! Fit `y = slope * x + intercept` twice: once through the silent facade and
//! once with the engine's summary logging turned on.
//!
//! ```bash
//! cargo run --example line_fit
//! RUST_LOG=debug cargo run --example line_fit
//! ```

use nalgebra::{DMatrix, DVector};
use quietsolve::core::factors::Factor;
use quietsolve::core::problem::{ParameterBlockId, Problem};
use quietsolve::optimizer::LoggingType;
use quietsolve::quiet::{QuietConfig, solve_silent};
use quietsolve::{SolverError, init_logger};
use tracing::info;

struct LinePointFactor {
    x: f64,
    y: f64,
}

impl Factor for LinePointFactor {
    fn get_dimension(&self) -> usize {
        1
    }

    fn linearize(&self, params: &[DVector<f64>]) -> (DVector<f64>, DMatrix<f64>) {
        let residual = DVector::from_element(1, params[0][0] * self.x + params[1][0] - self.y);
        let jacobian = DMatrix::from_row_slice(1, 2, &[self.x, 1.0]);
        (residual, jacobian)
    }

    fn parameter_block_sizes(&self) -> Option<Vec<usize>> {
        Some(vec![1, 1])
    }
}

fn build_problem() -> Result<(Problem, ParameterBlockId, ParameterBlockId), SolverError> {
    let mut problem = Problem::new();
    let slope = problem.add_parameter_block(&[0.0])?;
    let intercept = problem.add_parameter_block(&[0.0])?;
    for i in 0..20 {
        let x = i as f64 * 0.5;
        // small deterministic noise around y = 3x + 2
        let noise = 0.05 * ((i * 37) % 11) as f64 / 11.0 - 0.025;
        problem.add_residual_block(
            LinePointFactor {
                x,
                y: 3.0 * x + 2.0 + noise,
            },
            &[slope, intercept],
        )?;
    }
    Ok((problem, slope, intercept))
}

fn read(problem: &Problem, id: ParameterBlockId) -> f64 {
    problem.parameter_block(id).map_or(f64::NAN, |values| values[0])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    // Nothing below this call is logged by the solver.
    let (mut problem, slope, intercept) = build_problem()?;
    let summary = solve_silent(&mut problem, 100, 2, 1e-10, 1e-10);
    info!(
        slope = read(&problem, slope),
        intercept = read(&problem, intercept),
        status = %summary.status,
        iterations = summary.iterations,
        "silent solve finished"
    );

    // Same problem, engine allowed to report its own summary.
    let (mut problem, slope, intercept) = build_problem()?;
    let summary = QuietConfig::new()
        .with_logging(LoggingType::Summary)
        .with_thread_count(2)
        .with_max_iterations(100)
        .with_function_tolerance(1e-10)
        .with_gradient_tolerance(1e-10)
        .solve(&mut problem);
    info!(
        slope = read(&problem, slope),
        intercept = read(&problem, intercept),
        "solve with summary logging finished"
    );

    if summary.is_solution_usable() {
        Ok(())
    } else {
        Err(format!("line fit did not converge: {}", summary.status).into())
    }
}
