use std::sync::Arc;

use nalgebra as na;

use crate::core::factors::Factor;
use crate::core::problem::ParameterBlockId;
use crate::error::{SolverError, SolverResult};

#[derive(Clone)]
pub struct ResidualBlock {
    pub residual_block_id: usize,
    pub parameter_blocks: Vec<ParameterBlockId>,
    pub factor: Arc<dyn Factor>,
}

impl ResidualBlock {
    pub fn new(
        residual_block_id: usize,
        parameter_blocks: &[ParameterBlockId],
        factor: Arc<dyn Factor>,
    ) -> Self {
        ResidualBlock {
            residual_block_id,
            parameter_blocks: parameter_blocks.to_vec(),
            factor,
        }
    }

    pub fn dimension(&self) -> usize {
        self.factor.get_dimension()
    }

    /// Residual and, optionally, Jacobian of this block at `params`.
    ///
    /// Fails if the factor returns something whose shape does not match
    /// its declared dimension and the sizes of its parameter blocks.
    pub fn evaluate(
        &self,
        params: &[na::DVector<f64>],
        with_jacobian: bool,
    ) -> SolverResult<(na::DVector<f64>, Option<na::DMatrix<f64>>)> {
        let dim = self.dimension();
        let (residual, jacobian) = if with_jacobian {
            let (res, jac) = self.factor.linearize(params);
            (res, Some(jac))
        } else {
            (self.factor.residual(params), None)
        };

        if residual.nrows() != dim {
            return Err(SolverError::Evaluation(format!(
                "residual block {} produced {} residuals, expected {}",
                self.residual_block_id,
                residual.nrows(),
                dim
            )));
        }
        if let Some(jac) = jacobian.as_ref() {
            let cols: usize = params.iter().map(|p| p.nrows()).sum();
            if jac.shape() != (dim, cols) {
                return Err(SolverError::Evaluation(format!(
                    "residual block {} produced a {}x{} jacobian, expected {}x{}",
                    self.residual_block_id,
                    jac.nrows(),
                    jac.ncols(),
                    dim,
                    cols
                )));
            }
        }
        Ok((residual, jacobian))
    }
}
