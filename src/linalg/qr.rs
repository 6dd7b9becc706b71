use faer::{Mat, linalg::solvers::SolveLstsqCore};

use super::{DenseLinearSolver, LinAlgResult, check_dimensions, ensure_finite};

#[derive(Debug, Clone, Default)]
pub struct DenseQRSolver;

impl DenseQRSolver {
    pub fn new() -> Self {
        DenseQRSolver
    }
}

impl DenseLinearSolver for DenseQRSolver {
    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &Mat<f64>,
        lambda: f64,
    ) -> LinAlgResult<Mat<f64>> {
        check_dimensions(residuals, jacobian)?;
        let m = jacobian.nrows();
        let n = jacobian.ncols();

        // (J^T J + lambda I) dx = -J^T r is the least squares problem
        //   [ J              ]        [ -r ]
        //   [ sqrt(lambda) I ] dx  =  [  0 ]
        let sqrt_lambda = lambda.sqrt();
        let j_aug = Mat::from_fn(m + n, n, |i, j| {
            if i < m {
                jacobian[(i, j)]
            } else if i - m == j {
                sqrt_lambda
            } else {
                0.0
            }
        });
        let mut r_aug = Mat::from_fn(m + n, 1, |i, _| if i < m { -residuals[(i, 0)] } else { 0.0 });

        let qr = j_aug.as_ref().qr();
        qr.solve_lstsq_in_place_with_conj(faer::Conj::No, r_aug.as_mut());

        // The solution dx is in the top n rows of the result.
        ensure_finite(r_aug.submatrix(0, 0, n, 1).to_owned())
    }
}
