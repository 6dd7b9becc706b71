//! Cost functions that residual blocks evaluate.
//!
//! A [`Factor`] maps the current values of its parameter blocks to a
//! residual vector and the Jacobian of that residual. Jacobian columns are
//! laid out block by block, in the order the parameter blocks were given to
//! [`Problem::add_residual_block`](crate::core::problem::Problem::add_residual_block).

use std::sync::{Mutex, PoisonError};

use nalgebra as na;

pub trait Factor: Send + Sync {
    /// Number of residuals this factor produces.
    fn get_dimension(&self) -> usize;

    /// Residual and Jacobian at `params`.
    fn linearize(&self, params: &[na::DVector<f64>]) -> (na::DVector<f64>, na::DMatrix<f64>);

    /// Residual only. Override when the Jacobian is expensive.
    fn residual(&self, params: &[na::DVector<f64>]) -> na::DVector<f64> {
        self.linearize(params).0
    }

    /// Expected size of each parameter block, in order. `None` accepts any
    /// layout; the residual and Jacobian shapes are still checked when the
    /// factor is evaluated.
    fn parameter_block_sizes(&self) -> Option<Vec<usize>> {
        None
    }

    /// Expected number of parameter blocks, when fixed.
    fn num_parameter_blocks(&self) -> Option<usize> {
        self.parameter_block_sizes().map(|sizes| sizes.len())
    }
}

/// Pulls a single parameter block toward a fixed target: `r = x - target`.
#[derive(Debug, Clone)]
pub struct PriorFactor {
    pub v: na::DVector<f64>,
}

impl PriorFactor {
    pub fn new(target: &[f64]) -> Self {
        Self {
            v: na::DVector::from_column_slice(target),
        }
    }
}

impl Factor for PriorFactor {
    fn get_dimension(&self) -> usize {
        self.v.nrows()
    }

    fn linearize(&self, params: &[na::DVector<f64>]) -> (na::DVector<f64>, na::DMatrix<f64>) {
        let residual = &params[0] - &self.v;
        let jacobian = na::DMatrix::<f64>::identity(residual.nrows(), residual.nrows());
        (residual, jacobian)
    }

    fn residual(&self, params: &[na::DVector<f64>]) -> na::DVector<f64> {
        &params[0] - &self.v
    }

    fn parameter_block_sizes(&self) -> Option<Vec<usize>> {
        Some(vec![self.v.nrows()])
    }
}

/// Runs a residual callback of the form `f(params, residuals, jacobian)`.
///
/// The callback fills `residuals` and, when `jacobian` is `Some`, the
/// row-major `num_residuals x params.len()` Jacobian.
pub(crate) fn eval_residual_callback<F>(
    callback: &mut F,
    params: &[f64],
    num_residuals: usize,
    with_jacobian: bool,
) -> (na::DVector<f64>, Option<na::DMatrix<f64>>)
where
    F: FnMut(&[f64], &mut [f64], Option<&mut [f64]>) + ?Sized,
{
    let mut residuals = vec![0.0; num_residuals];
    if with_jacobian {
        let mut jacobian = vec![0.0; num_residuals * params.len()];
        callback(params, &mut residuals, Some(&mut jacobian));
        (
            na::DVector::from_vec(residuals),
            Some(na::DMatrix::from_row_slice(
                num_residuals,
                params.len(),
                &jacobian,
            )),
        )
    } else {
        callback(params, &mut residuals, None);
        (na::DVector::from_vec(residuals), None)
    }
}

/// Factor over a single parameter block backed by a residual callback.
///
/// The callback may be stateful (`FnMut`); calls are serialized through a
/// mutex, so the factor is evaluated by one worker at a time.
pub struct ClosureFactor<F> {
    callback: Mutex<F>,
    num_residuals: usize,
}

impl<F> ClosureFactor<F>
where
    F: FnMut(&[f64], &mut [f64], Option<&mut [f64]>) + Send,
{
    pub fn new(num_residuals: usize, callback: F) -> Self {
        Self {
            callback: Mutex::new(callback),
            num_residuals,
        }
    }

    fn call(
        &self,
        params: &[na::DVector<f64>],
        with_jacobian: bool,
    ) -> (na::DVector<f64>, Option<na::DMatrix<f64>>) {
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        eval_residual_callback(
            &mut *callback,
            params[0].as_slice(),
            self.num_residuals,
            with_jacobian,
        )
    }
}

impl<F> Factor for ClosureFactor<F>
where
    F: FnMut(&[f64], &mut [f64], Option<&mut [f64]>) + Send,
{
    fn get_dimension(&self) -> usize {
        self.num_residuals
    }

    fn linearize(&self, params: &[na::DVector<f64>]) -> (na::DVector<f64>, na::DMatrix<f64>) {
        let (residual, jacobian) = self.call(params, true);
        let jacobian =
            jacobian.unwrap_or_else(|| na::DMatrix::zeros(self.num_residuals, params[0].nrows()));
        (residual, jacobian)
    }

    fn residual(&self, params: &[na::DVector<f64>]) -> na::DVector<f64> {
        self.call(params, false).0
    }

    fn num_parameter_blocks(&self) -> Option<usize> {
        Some(1)
    }
}
