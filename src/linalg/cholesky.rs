use faer::linalg::solvers::Solve;
use faer::Mat;

use super::{DenseLinearSolver, LinAlgError, LinAlgResult, check_dimensions, ensure_finite};

#[derive(Debug, Clone, Default)]
pub struct DenseCholeskySolver;

impl DenseCholeskySolver {
    pub fn new() -> Self {
        DenseCholeskySolver
    }
}

impl DenseLinearSolver for DenseCholeskySolver {
    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &Mat<f64>,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>> {
        check_dimensions(residuals, jacobian)?;

        // H = J^T * J + lambda * I
        let mut hessian = jacobian.transpose() * jacobian.as_ref();
        for i in 0..hessian.nrows() {
            hessian[(i, i)] += lambda;
        }
        // g = -J^T * r
        let gradient = jacobian.transpose() * residuals.as_ref();
        let neg_gradient = Mat::from_fn(gradient.nrows(), 1, |i, _| -gradient[(i, 0)]);

        let llt = hessian
            .as_ref()
            .llt(faer::Side::Lower)
            .map_err(|e| LinAlgError::FactorizationFailed(format!("{e:?}")))?;
        ensure_finite(llt.solve(neg_gradient.as_ref()))
    }
}
