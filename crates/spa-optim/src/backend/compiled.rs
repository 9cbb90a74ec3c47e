use crate::error::{Result, SpaError};
use crate::factors::{relative_pose_jacobian, JacobianRequest, RelativePoseCost};
use crate::ir::{FactorKind, JacobianMode, ParamArena, ParamId, ProblemIR, ResidualBlock};
use crate::jacobian_ad::relative_pose_jacobian_ad;
use crate::robust::RobustCorrection;
use nalgebra::{DMatrix, DVector, SMatrix, Vector3};

/// IR lowered onto a dense vector of free scalars.
///
/// Constant scalars keep their arena value and get no Jacobian column.
/// Columns follow arena order, so the layout is a pure function of the IR.
#[derive(Debug, Clone)]
pub struct CompiledProblem<'a> {
    ir: &'a ProblemIR,
    base: ParamArena,
    /// Column of each arena scalar, `None` for constants.
    columns: Vec<Option<usize>>,
    num_free: usize,
}

impl<'a> CompiledProblem<'a> {
    /// Validate `ir` and build the column layout from the values in `arena`.
    pub fn new(ir: &'a ProblemIR, arena: &ParamArena) -> Result<Self> {
        ir.validate()?;
        if arena.num_blocks() != ir.params.len() {
            return Err(SpaError::Construction(format!(
                "arena holds {} blocks, problem has {}",
                arena.num_blocks(),
                ir.params.len()
            )));
        }

        let mut columns = vec![None; arena.len()];
        let mut num_free = 0;
        for block in &ir.params {
            let offset = arena.offset(block.id).unwrap_or_default();
            for idx in 0..block.dim {
                if !block.fixed.is_fixed(idx) {
                    columns[offset + idx] = Some(num_free);
                    num_free += 1;
                }
            }
        }

        Ok(Self {
            ir,
            base: arena.clone(),
            columns,
            num_free,
        })
    }

    pub fn num_free(&self) -> usize {
        self.num_free
    }

    pub fn num_residuals(&self) -> usize {
        self.ir.num_residuals()
    }

    /// Free scalars of the starting arena, in column order.
    pub fn initial_params(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_free);
        for (slot, col) in self.columns.iter().enumerate() {
            if let Some(col) = col {
                x[*col] = self.base.as_slice()[slot];
            }
        }
        x
    }

    fn expand(&self, x: &DVector<f64>) -> ParamArena {
        let mut arena = self.base.clone();
        let values = arena.as_mut_slice();
        for (slot, col) in self.columns.iter().enumerate() {
            if let Some(col) = col {
                values[slot] = x[*col];
            }
        }
        arena
    }

    /// Copy the free scalars of `x` into `arena`; constants are left untouched.
    pub fn write_back(&self, x: &DVector<f64>, arena: &mut ParamArena) {
        let values = arena.as_mut_slice();
        for (slot, col) in self.columns.iter().enumerate() {
            if let Some(col) = col {
                values[slot] = x[*col];
            }
        }
    }

    /// Robustified residual vector.
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let arena = self.expand(x);
        let mut r = DVector::zeros(self.num_residuals());
        let mut row = 0;
        for block in &self.ir.residuals {
            let r_block = match &block.factor {
                FactorKind::RelativePose2 { cost } => {
                    let (source, target) = pose_pair(&arena, block);
                    let raw = cost.residual(&source, &target);
                    robust_correction(block, &raw).residual(&raw)
                }
            };
            r.rows_mut(row, block.residual_dim).copy_from(&r_block);
            row += block.residual_dim;
        }
        r
    }

    /// Jacobian of [`Self::residuals`] with respect to the free scalars.
    pub fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let arena = self.expand(x);
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_free);
        let mut row = 0;
        for block in &self.ir.residuals {
            match &block.factor {
                FactorKind::RelativePose2 { cost } => {
                    let (source, target) = pose_pair(&arena, block);
                    let request = self.free_columns(block);
                    let local = relative_pose_block_jacobian(
                        cost,
                        block.jacobian,
                        &source,
                        &target,
                        request,
                    );
                    let raw = cost.residual(&source, &target);
                    let local = robust_correction(block, &raw).jacobian(&raw, &local);
                    self.scatter(&mut j, &local, row, block);
                }
            }
            row += block.residual_dim;
        }
        j
    }

    /// `½ ||r(x)||²`, i.e. `½ Σ ρ(s_i)`.
    pub fn cost(&self, x: &DVector<f64>) -> f64 {
        0.5 * self.residuals(x).norm_squared()
    }

    fn column(&self, id: ParamId, idx: usize) -> Option<usize> {
        let offset = self.base.offset(id)?;
        self.columns.get(offset + idx).copied().flatten()
    }

    /// Request only the columns that map to free scalars.
    fn free_columns(&self, block: &ResidualBlock) -> JacobianRequest {
        let mut mask = [false; 6];
        for (b, id) in block.params.iter().enumerate() {
            for idx in 0..3 {
                mask[3 * b + idx] = self.column(*id, idx).is_some();
            }
        }
        JacobianRequest::from_mask(mask)
    }

    fn scatter(
        &self,
        j: &mut DMatrix<f64>,
        local: &SMatrix<f64, 3, 6>,
        row: usize,
        block: &ResidualBlock,
    ) {
        for (b, id) in block.params.iter().enumerate() {
            for idx in 0..3 {
                if let Some(col) = self.column(*id, idx) {
                    for i in 0..3 {
                        // += so a block referencing the same pose twice sums both halves
                        j[(row + i, col)] += local[(i, 3 * b + idx)];
                    }
                }
            }
        }
    }
}

fn pose_pair(arena: &ParamArena, block: &ResidualBlock) -> ([f64; 3], [f64; 3]) {
    (
        pose_scalars(arena, block.params[0]),
        pose_scalars(arena, block.params[1]),
    )
}

fn pose_scalars(arena: &ParamArena, id: ParamId) -> [f64; 3] {
    // dimensions are checked by ProblemIR::validate
    let b = arena.block(id).unwrap_or(&[0.0; 3]);
    [b[0], b[1], b[2]]
}

fn robust_correction(block: &ResidualBlock, raw: &Vector3<f64>) -> RobustCorrection {
    block.loss.correction(raw.norm_squared())
}

fn relative_pose_block_jacobian(
    cost: &RelativePoseCost,
    mode: JacobianMode,
    source: &[f64; 3],
    target: &[f64; 3],
    request: JacobianRequest,
) -> SMatrix<f64, 3, 6> {
    match mode {
        JacobianMode::Analytic => {
            relative_pose_jacobian(&cost.sqrt_information, source, target, request).to_matrix()
        }
        JacobianMode::AutoDiff => relative_pose_jacobian_ad(cost, source, target),
    }
}
