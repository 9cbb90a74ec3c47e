use crate::error::{ensure_construction, Result, SpaError};
use crate::factors::RelativePoseCost;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier for a parameter block in the IR.
///
/// This is the block's index in [`ProblemIR::params`] and doubles as the
/// arena index of its scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub usize);

/// Fixed parameter mask for a block.
///
/// Indices are kept ordered so that compiled column layouts are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedMask {
    fixed_indices: BTreeSet<usize>,
}

impl FixedMask {
    /// Creates a mask with no fixed indices.
    pub fn all_free() -> Self {
        Self::default()
    }

    /// Returns `true` if the index is fixed.
    pub fn is_fixed(&self, idx: usize) -> bool {
        self.fixed_indices.contains(&idx)
    }

    /// Iterates over fixed indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.fixed_indices.iter().copied()
    }

    /// Marks `idx` fixed; returns `false` if it already was.
    fn insert(&mut self, idx: usize) -> bool {
        self.fixed_indices.insert(idx)
    }
}

/// Robust loss applied to a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RobustLoss {
    #[default]
    None,
    Huber {
        scale: f64,
    },
}

/// How a residual block supplies its Jacobian.
///
/// Chosen once when the problem is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JacobianMode {
    /// Closed-form derivative columns.
    #[default]
    Analytic,
    /// Dual-number differentiation of the generic residual.
    #[serde(alias = "auto_diff")]
    AutoDiff,
}

/// Backend-agnostic factor kinds.
///
/// Each factor kind implies its parameter layout and residual dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    /// SE(2) relative-pose residual.
    ///
    /// Parameters: [source_pose, target_pose], each `[x, y, θ]`.
    RelativePose2 { cost: RelativePoseCost },
}

impl FactorKind {
    /// Residual dimension implied by the factor.
    pub fn residual_dim(&self) -> usize {
        match self {
            FactorKind::RelativePose2 { .. } => 3,
        }
    }

    /// Expected dimensions of the parameter blocks, in order.
    pub fn param_dims(&self) -> &'static [usize] {
        match self {
            FactorKind::RelativePose2 { .. } => &[3, 3],
        }
    }
}

/// Parameter block definition in the IR.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    pub id: ParamId,
    pub name: String,
    pub dim: usize,
    pub fixed: FixedMask,
}

impl ParamBlock {
    /// Number of scalars left free for the solver.
    pub fn effective_dim(&self) -> usize {
        (0..self.dim).filter(|&i| !self.fixed.is_fixed(i)).count()
    }
}

/// Residual block definition in the IR.
///
/// The order of `params` must match the factor's expected parameter order.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub params: Vec<ParamId>,
    pub loss: RobustLoss,
    pub factor: FactorKind,
    pub jacobian: JacobianMode,
    pub residual_dim: usize,
}

/// Backend-agnostic optimization problem representation.
#[derive(Debug, Default, Clone)]
pub struct ProblemIR {
    pub params: Vec<ParamBlock>,
    pub residuals: Vec<ResidualBlock>,
}

impl ProblemIR {
    /// Creates an empty IR.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter block and returns its `ParamId`.
    pub fn add_param_block(&mut self, name: impl Into<String>, dim: usize) -> ParamId {
        let id = ParamId(self.params.len());
        self.params.push(ParamBlock {
            id,
            name: name.into(),
            dim,
            fixed: FixedMask::all_free(),
        });
        id
    }

    /// Adds a residual block to the IR.
    pub fn add_residual_block(&mut self, residual: ResidualBlock) {
        self.residuals.push(residual);
    }

    /// Holds scalar `idx` of block `id` constant.
    ///
    /// Marking the same scalar twice is a construction error.
    pub fn set_constant(&mut self, id: ParamId, idx: usize) -> Result<()> {
        let block = self
            .params
            .get_mut(id.0)
            .ok_or_else(|| SpaError::Construction(format!("unknown param {:?}", id)))?;
        ensure_construction!(
            idx < block.dim,
            "param {} constant index {} out of range (dim {})",
            block.name,
            idx,
            block.dim
        );
        ensure_construction!(
            block.fixed.insert(idx),
            "param {} index {} is already held constant",
            block.name,
            idx
        );
        Ok(())
    }

    /// Holds every scalar of block `id` constant.
    pub fn set_block_constant(&mut self, id: ParamId) -> Result<()> {
        let dim = self
            .params
            .get(id.0)
            .map(|b| b.dim)
            .ok_or_else(|| SpaError::Construction(format!("unknown param {:?}", id)))?;
        for idx in 0..dim {
            self.set_constant(id, idx)?;
        }
        Ok(())
    }

    /// Finds a parameter by name.
    pub fn param_by_name(&self, name: &str) -> Option<ParamId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.id)
    }

    /// Total scalar residual count.
    pub fn num_residuals(&self) -> usize {
        self.residuals.iter().map(|r| r.residual_dim).sum()
    }

    /// Total scalar parameter count, constant ones included.
    pub fn num_parameters(&self) -> usize {
        self.params.iter().map(|p| p.dim).sum()
    }

    /// Scalar parameter count excluding constant ones.
    pub fn num_effective_parameters(&self) -> usize {
        self.params.iter().map(ParamBlock::effective_dim).sum()
    }

    /// Validates internal consistency and factor expectations.
    pub fn validate(&self) -> Result<()> {
        for (idx, param) in self.params.iter().enumerate() {
            ensure_construction!(
                param.id.0 == idx,
                "param id mismatch: expected {}, got {:?}",
                idx,
                param.id
            );
            for fixed_idx in param.fixed.iter() {
                ensure_construction!(
                    fixed_idx < param.dim,
                    "param {} fixed index {} out of range",
                    param.name,
                    fixed_idx
                );
            }
        }

        for (r_idx, residual) in self.residuals.iter().enumerate() {
            ensure_construction!(
                residual.residual_dim == residual.factor.residual_dim(),
                "residual {} dim {} does not match factor expectation {}",
                r_idx,
                residual.residual_dim,
                residual.factor.residual_dim()
            );
            let dims = residual.factor.param_dims();
            ensure_construction!(
                residual.params.len() == dims.len(),
                "residual {} expects {} params, got {}",
                r_idx,
                dims.len(),
                residual.params.len()
            );
            for (param, &dim) in residual.params.iter().zip(dims) {
                let block = self.params.get(param.0).ok_or_else(|| {
                    SpaError::Construction(format!(
                        "residual {} references missing param {:?}",
                        r_idx, param
                    ))
                })?;
                ensure_construction!(
                    block.dim == dim,
                    "residual {} expects {}D param, {} has dim {}",
                    r_idx,
                    dim,
                    block.name,
                    block.dim
                );
            }
            if let RobustLoss::Huber { scale } = residual.loss {
                ensure_construction!(
                    scale > 0.0 && scale.is_finite(),
                    "residual {} Huber scale must be positive, got {}",
                    r_idx,
                    scale
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spa_core::{Mat3, Pose2};

    fn relative_block(params: Vec<ParamId>) -> ResidualBlock {
        let factor = FactorKind::RelativePose2 {
            cost: RelativePoseCost::new(Pose2::new(1.0, 0.0, 0.0), Mat3::identity()),
        };
        ResidualBlock {
            params,
            loss: RobustLoss::Huber { scale: 1.0 },
            residual_dim: factor.residual_dim(),
            factor,
            jacobian: JacobianMode::Analytic,
        }
    }

    #[test]
    fn counts_parameters_and_residuals() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        let b = ir.add_param_block("pose/1", 3);
        ir.add_residual_block(relative_block(vec![a, b]));
        ir.set_block_constant(a).unwrap();

        assert_eq!(ir.num_residuals(), 3);
        assert_eq!(ir.num_parameters(), 6);
        assert_eq!(ir.num_effective_parameters(), 3);
        assert_eq!(ir.params[a.0].effective_dim(), 0);
        assert_eq!(ir.params[a.0].fixed.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(ir.param_by_name("pose/1"), Some(b));
        ir.validate().unwrap();
    }

    #[test]
    fn duplicate_constant_marking_is_rejected() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        ir.set_constant(a, 1).unwrap();
        let err = ir.set_constant(a, 1).unwrap_err();
        assert!(matches!(err, SpaError::Construction(_)), "got {err}");
        assert!(ir.set_block_constant(a).is_err());
    }

    #[test]
    fn constant_index_out_of_range_is_rejected() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        assert!(ir.set_constant(a, 3).is_err());
        assert!(ir.set_constant(ParamId(9), 0).is_err());
    }

    #[test]
    fn validate_catches_missing_param() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        ir.add_residual_block(relative_block(vec![a, ParamId(4)]));
        assert!(matches!(ir.validate(), Err(SpaError::Construction(_))));
    }

    #[test]
    fn validate_catches_wrong_block_dim() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        let b = ir.add_param_block("scalar", 1);
        ir.add_residual_block(relative_block(vec![a, b]));
        assert!(ir.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_huber_scale() {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        let b = ir.add_param_block("pose/1", 3);
        let mut block = relative_block(vec![a, b]);
        block.loss = RobustLoss::Huber { scale: 0.0 };
        ir.add_residual_block(block);
        assert!(ir.validate().is_err());
    }

    #[test]
    fn jacobian_mode_parses_lowercase() {
        let m: JacobianMode = serde_json::from_str("\"autodiff\"").unwrap();
        assert_eq!(m, JacobianMode::AutoDiff);
        let m: JacobianMode = serde_json::from_str("\"analytic\"").unwrap();
        assert_eq!(m, JacobianMode::Analytic);
    }
}
