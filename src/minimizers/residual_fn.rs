use nalgebra as na;

/// A vector-valued residual over a flat parameter vector.
pub trait ResidualFn {
    fn get_residuals(&self, params: &[f64]) -> Vec<f64>;

    fn num_residuals(&self) -> usize;

    /// Least squares cost `0.5 * ||r||^2`.
    fn get_cost(&self, params: &[f64]) -> f64 {
        0.5 * self
            .get_residuals(params)
            .iter()
            .map(|r| r * r)
            .sum::<f64>()
    }
}

impl<T> ResidualFn for Box<T>
where
    T: ResidualFn + ?Sized,
{
    fn get_residuals(&self, params: &[f64]) -> Vec<f64> {
        self.as_ref().get_residuals(params)
    }

    fn num_residuals(&self) -> usize {
        self.as_ref().num_residuals()
    }
}

/// A residual with an analytic Jacobian.
pub trait DifferentiableResidualFn: ResidualFn {
    /// `num_residuals x params.len()` Jacobian.
    fn get_grad(&self, params: &[f64]) -> na::DMatrix<f64>;

    fn get_residuals_and_grad(&self, params: &[f64]) -> (Vec<f64>, na::DMatrix<f64>) {
        (self.get_residuals(params), self.get_grad(params))
    }
}

impl<T> DifferentiableResidualFn for Box<T>
where
    T: DifferentiableResidualFn + ?Sized,
{
    fn get_grad(&self, params: &[f64]) -> na::DMatrix<f64> {
        self.as_ref().get_grad(params)
    }

    fn get_residuals_and_grad(&self, params: &[f64]) -> (Vec<f64>, na::DMatrix<f64>) {
        self.as_ref().get_residuals_and_grad(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offset(f64);

    impl ResidualFn for Offset {
        fn get_residuals(&self, params: &[f64]) -> Vec<f64> {
            params.iter().map(|p| p - self.0).collect()
        }

        fn num_residuals(&self) -> usize {
            2
        }
    }

    impl DifferentiableResidualFn for Offset {
        fn get_grad(&self, params: &[f64]) -> na::DMatrix<f64> {
            na::DMatrix::identity(params.len(), params.len())
        }
    }

    #[test]
    fn test_default_cost() {
        let f = Offset(1.0);
        assert_eq!(f.get_cost(&[3.0, 1.0]), 2.0);
    }

    #[test]
    fn test_boxed_dyn_forwards() {
        let f: Box<dyn DifferentiableResidualFn> = Box::new(Offset(0.5));
        let (res, grad) = f.get_residuals_and_grad(&[1.0, 2.0]);

        assert_eq!(f.num_residuals(), 2);
        assert_eq!(res, vec![0.5, 1.5]);
        assert_eq!(grad, na::DMatrix::identity(2, 2));
    }
}
