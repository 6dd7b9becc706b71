use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use faer::Mat;
use nalgebra as na;
use rayon::prelude::*;
use thiserror::Error;

use crate::core::factors::Factor;
use crate::core::residual_block::ResidualBlock;
use crate::core::{Evaluation, Optimizable};
use crate::error::{SolverError, SolverResult};

/// Errors raised while building a [`Problem`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProblemError {
    #[error("parameter block {0} does not exist")]
    UnknownParameterBlock(usize),

    #[error("residual block {0} does not exist")]
    UnknownResidualBlock(usize),

    #[error("parameter blocks must hold at least one value")]
    EmptyParameterBlock,

    #[error("parameter block {0} appears more than once in a residual block")]
    DuplicateParameterBlock(usize),

    #[error("residual blocks must produce at least one residual")]
    EmptyResidualBlock,

    #[error("parameter block {id}: expected {expected} values, got {actual}")]
    SizeMismatch {
        id: usize,
        expected: usize,
        actual: usize,
    },

    #[error("residual blocks must depend on at least one parameter block")]
    NoParameterBlocks,

    #[error("factor takes {expected} parameter blocks, got {actual}")]
    ParameterBlockCountMismatch { expected: usize, actual: usize },
}

pub type ProblemResult<T> = Result<T, ProblemError>;

/// Handle to a parameter block owned by a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterBlockId(usize);

impl ParameterBlockId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a residual block owned by a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResidualBlockId(usize);

#[derive(Debug, Clone)]
struct ParameterBlock {
    values: Vec<f64>,
    constant: bool,
}

/// A nonlinear least squares problem: parameter blocks plus the residual
/// blocks that depend on them.
///
/// The problem owns its parameter values. Solving updates them in place;
/// read the result back with [`Problem::parameter_block`]. Cloning is cheap
/// for the factors (they are shared) and copies every parameter value, so a
/// clone can be solved independently of the original.
#[derive(Clone, Default)]
pub struct Problem {
    parameter_blocks: Vec<ParameterBlock>,
    residual_blocks: BTreeMap<usize, ResidualBlock>,
    residual_id_count: usize,
    total_residual_dimension: usize,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parameter_block(&mut self, values: &[f64]) -> ProblemResult<ParameterBlockId> {
        if values.is_empty() {
            return Err(ProblemError::EmptyParameterBlock);
        }
        self.parameter_blocks.push(ParameterBlock {
            values: values.to_vec(),
            constant: false,
        });
        Ok(ParameterBlockId(self.parameter_blocks.len() - 1))
    }

    pub fn parameter_block(&self, id: ParameterBlockId) -> Option<&[f64]> {
        self.parameter_blocks.get(id.0).map(|b| b.values.as_slice())
    }

    /// Overwrite the values of a parameter block, e.g. to restart a solve.
    pub fn set_parameter_block(
        &mut self,
        id: ParameterBlockId,
        values: &[f64],
    ) -> ProblemResult<()> {
        let block = self.block_mut(id)?;
        if block.values.len() != values.len() {
            return Err(ProblemError::SizeMismatch {
                id: id.0,
                expected: block.values.len(),
                actual: values.len(),
            });
        }
        block.values.copy_from_slice(values);
        Ok(())
    }

    /// Hold a parameter block fixed during optimization.
    pub fn set_parameter_block_constant(&mut self, id: ParameterBlockId) -> ProblemResult<()> {
        self.block_mut(id)?.constant = true;
        Ok(())
    }

    pub fn set_parameter_block_variable(&mut self, id: ParameterBlockId) -> ProblemResult<()> {
        self.block_mut(id)?.constant = false;
        Ok(())
    }

    pub fn is_parameter_block_constant(&self, id: ParameterBlockId) -> Option<bool> {
        self.parameter_blocks.get(id.0).map(|b| b.constant)
    }

    pub fn add_residual_block<F>(
        &mut self,
        factor: F,
        parameter_blocks: &[ParameterBlockId],
    ) -> ProblemResult<ResidualBlockId>
    where
        F: Factor + 'static,
    {
        if factor.get_dimension() == 0 {
            return Err(ProblemError::EmptyResidualBlock);
        }
        if parameter_blocks.is_empty() {
            return Err(ProblemError::NoParameterBlocks);
        }
        let mut seen = HashSet::with_capacity(parameter_blocks.len());
        for id in parameter_blocks {
            if id.0 >= self.parameter_blocks.len() {
                return Err(ProblemError::UnknownParameterBlock(id.0));
            }
            if !seen.insert(id.0) {
                return Err(ProblemError::DuplicateParameterBlock(id.0));
            }
        }
        if let Some(expected) = factor.num_parameter_blocks() {
            if expected != parameter_blocks.len() {
                return Err(ProblemError::ParameterBlockCountMismatch {
                    expected,
                    actual: parameter_blocks.len(),
                });
            }
        }
        if let Some(sizes) = factor.parameter_block_sizes() {
            for (id, &expected) in parameter_blocks.iter().zip(&sizes) {
                let actual = self.parameter_blocks[id.0].values.len();
                if actual != expected {
                    return Err(ProblemError::SizeMismatch {
                        id: id.0,
                        expected,
                        actual,
                    });
                }
            }
        }

        let block_id = self.residual_id_count;
        let block = ResidualBlock::new(block_id, parameter_blocks, Arc::new(factor));
        self.total_residual_dimension += block.dimension();
        self.residual_blocks.insert(block_id, block);
        self.residual_id_count += 1;

        Ok(ResidualBlockId(block_id))
    }

    pub fn remove_residual_block(&mut self, id: ResidualBlockId) -> ProblemResult<()> {
        let block = self
            .residual_blocks
            .remove(&id.0)
            .ok_or(ProblemError::UnknownResidualBlock(id.0))?;
        self.total_residual_dimension -= block.dimension();
        Ok(())
    }

    pub fn num_parameter_blocks(&self) -> usize {
        self.parameter_blocks.len()
    }

    /// Total number of scalar parameters, constant blocks included.
    pub fn num_parameters(&self) -> usize {
        self.parameter_blocks.iter().map(|b| b.values.len()).sum()
    }

    pub fn num_residual_blocks(&self) -> usize {
        self.residual_blocks.len()
    }

    /// `0.5 * ||r||^2` at the current parameter values.
    pub fn cost(&self) -> SolverResult<f64> {
        Ok(self.evaluate(&self.state(), false)?.cost())
    }

    fn block_mut(&mut self, id: ParameterBlockId) -> ProblemResult<&mut ParameterBlock> {
        self.parameter_blocks
            .get_mut(id.0)
            .ok_or(ProblemError::UnknownParameterBlock(id.0))
    }

    /// Offset of each parameter block inside the state vector, `None` for
    /// constant blocks.
    fn column_layout(&self) -> (Vec<Option<usize>>, usize) {
        let mut offset = 0;
        let layout = self
            .parameter_blocks
            .iter()
            .map(|block| {
                if block.constant {
                    None
                } else {
                    let start = offset;
                    offset += block.values.len();
                    Some(start)
                }
            })
            .collect();
        (layout, offset)
    }
}

impl Optimizable for Problem {
    fn num_residuals(&self) -> usize {
        self.total_residual_dimension
    }

    fn num_effective_parameters(&self) -> usize {
        self.column_layout().1
    }

    fn state(&self) -> Vec<f64> {
        self.parameter_blocks
            .iter()
            .filter(|b| !b.constant)
            .flat_map(|b| b.values.iter().copied())
            .collect()
    }

    fn set_state(&mut self, state: &[f64]) {
        let mut offset = 0;
        for block in self.parameter_blocks.iter_mut().filter(|b| !b.constant) {
            let size = block.values.len();
            block.values.copy_from_slice(&state[offset..offset + size]);
            offset += size;
        }
    }

    fn evaluate(&self, state: &[f64], with_jacobian: bool) -> SolverResult<Evaluation> {
        let (layout, num_cols) = self.column_layout();
        if state.len() != num_cols {
            return Err(SolverError::Problem(format!(
                "state has {} values, problem has {} free parameters",
                state.len(),
                num_cols
            )));
        }

        let blocks: Vec<&ResidualBlock> = self.residual_blocks.values().collect();
        let linearized = blocks
            .par_iter()
            .map(|block| {
                let params: Vec<na::DVector<f64>> = block
                    .parameter_blocks
                    .iter()
                    .map(|id| {
                        let values = &self.parameter_blocks[id.0].values;
                        match layout[id.0] {
                            Some(start) => {
                                na::DVector::from_column_slice(&state[start..start + values.len()])
                            }
                            None => na::DVector::from_column_slice(values),
                        }
                    })
                    .collect();
                block.evaluate(&params, with_jacobian)
            })
            .collect::<SolverResult<Vec<_>>>()?;

        let mut residuals = Mat::<f64>::zeros(self.total_residual_dimension, 1);
        let mut jacobian =
            with_jacobian.then(|| Mat::<f64>::zeros(self.total_residual_dimension, num_cols));

        let mut row = 0;
        for (block, (res, jac)) in blocks.iter().zip(linearized) {
            for i in 0..res.nrows() {
                residuals[(row + i, 0)] = res[i];
            }
            if let (Some(total), Some(jac)) = (jacobian.as_mut(), jac) {
                let mut local_col = 0;
                for id in &block.parameter_blocks {
                    let size = self.parameter_blocks[id.0].values.len();
                    if let Some(start) = layout[id.0] {
                        for i in 0..jac.nrows() {
                            for j in 0..size {
                                total[(row + i, start + j)] = jac[(i, local_col + j)];
                            }
                        }
                    }
                    local_col += size;
                }
            }
            row += res.nrows();
        }

        Ok(Evaluation {
            residuals,
            jacobian,
        })
    }
}
