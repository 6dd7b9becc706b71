//! Benchmarks for the quiet solve facade.
//!
//! A circle fit with many observations, solved from the same start point at
//! several thread counts, plus the closure-level solver on the same data.

#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use nalgebra::{DMatrix, DVector};
use quietsolve::core::factors::Factor;
use quietsolve::core::problem::Problem;
use quietsolve::minimizers::ResidualSolver;
use quietsolve::quiet::solve_silent;

/// Squared distance to the circle: `(x - cx)^2 + (y - cy)^2 - r^2`.
struct CirclePointFactor {
    x: f64,
    y: f64,
}

impl Factor for CirclePointFactor {
    fn get_dimension(&self) -> usize {
        1
    }

    fn linearize(&self, params: &[DVector<f64>]) -> (DVector<f64>, DMatrix<f64>) {
        let (cx, cy, r) = (params[0][0], params[0][1], params[0][2]);
        let dx = self.x - cx;
        let dy = self.y - cy;
        let residual = DVector::from_element(1, dx * dx + dy * dy - r * r);
        let jacobian = DMatrix::from_row_slice(1, 3, &[-2.0 * dx, -2.0 * dy, -2.0 * r]);
        (residual, jacobian)
    }

    fn parameter_block_sizes(&self) -> Option<Vec<usize>> {
        Some(vec![3])
    }
}

fn circle_points(n: usize) -> Vec<(f64, f64)> {
    (0..n)
        .map(|i| {
            let t = i as f64 * std::f64::consts::TAU / n as f64;
            // deterministic wobble so the fit is not exact
            let wobble = 0.01 * ((i * 7919) % 13) as f64 / 13.0;
            (4.0 + (3.0 + wobble) * t.cos(), -1.0 + (3.0 + wobble) * t.sin())
        })
        .collect()
}

fn circle_problem(n: usize) -> Problem {
    let mut problem = Problem::new();
    let params = problem.add_parameter_block(&[0.0, 0.0, 1.0]).unwrap();
    for (x, y) in circle_points(n) {
        problem
            .add_residual_block(CirclePointFactor { x, y }, &[params])
            .unwrap();
    }
    problem
}

fn bench_solve_silent(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_silent_circle_2000");
    let problem = circle_problem(2000);
    for threads in [1, 2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let mut problem = problem.clone();
                black_box(solve_silent(&mut problem, 50, threads, 1e-10, 1e-10))
            });
        });
    }
    group.finish();
}

fn bench_residual_solver(c: &mut Criterion) {
    let points = circle_points(2000);
    let solver = ResidualSolver::new(1, 1e-10, 1e-10, false);
    c.bench_function("residual_solver_circle_2000", |b| {
        b.iter(|| {
            let mut residuals = |p: &[f64], r: &mut [f64], jac: Option<&mut [f64]>| {
                for (i, (x, y)) in points.iter().enumerate() {
                    r[i] = (x - p[0]).powi(2) + (y - p[1]).powi(2) - p[2] * p[2];
                }
                if let Some(j) = jac {
                    for (i, (x, y)) in points.iter().enumerate() {
                        j[3 * i] = -2.0 * (x - p[0]);
                        j[3 * i + 1] = -2.0 * (y - p[1]);
                        j[3 * i + 2] = -2.0 * p[2];
                    }
                }
            };
            let mut x = [0.0, 0.0, 1.0];
            black_box(solver.solve(&mut residuals, &mut x, points.len(), 50))
        });
    });
}

criterion_group!(benches, bench_solve_silent, bench_residual_solver);
criterion_main!(benches);
