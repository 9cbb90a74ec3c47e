//! Closed-form Jacobian of the whitened relative-pose residual.
//!
//! With `c = cos θ_s`, `s = sin θ_s`, `dx = x_t - x_s`, `dy = y_t - y_s` and
//! `S` the square-root information, row `i` of each column is
//!
//! | parameter | `∂r_i/∂p`                                                   |
//! |-----------|-------------------------------------------------------------|
//! | `x_s`     | `S(i,0)c - S(i,1)s`                                         |
//! | `y_s`     | `S(i,0)s + S(i,1)c`                                         |
//! | `θ_s`     | `S(i,0)(s·dx - c·dy) + S(i,1)(c·dx + s·dy) + S(i,2)`        |
//! | `x_t`     | `-∂r_i/∂x_s`                                                |
//! | `y_t`     | `-∂r_i/∂y_s`                                                |
//! | `θ_t`     | `-S(i,2)`                                                   |
//!
//! The target translation columns are computed as negations of the source
//! columns, so the symmetry holds bit for bit.

use nalgebra::SMatrix;
use spa_core::{Mat3, Real, Vec3};

/// One of the six scalar parameters of a relative-pose factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoseParam {
    SourceX,
    SourceY,
    SourceTheta,
    TargetX,
    TargetY,
    TargetTheta,
}

impl PoseParam {
    pub const ALL: [PoseParam; 6] = [
        PoseParam::SourceX,
        PoseParam::SourceY,
        PoseParam::SourceTheta,
        PoseParam::TargetX,
        PoseParam::TargetY,
        PoseParam::TargetTheta,
    ];

    /// Column index in the `[x_s, y_s, θ_s, x_t, y_t, θ_t]` layout.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which Jacobian columns a caller wants computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JacobianRequest([bool; 6]);

impl Default for JacobianRequest {
    fn default() -> Self {
        Self::all()
    }
}

impl JacobianRequest {
    pub fn all() -> Self {
        Self([true; 6])
    }

    pub fn none() -> Self {
        Self([false; 6])
    }

    /// Request by pose block: all three source columns and/or all three target columns.
    pub fn blocks(source: bool, target: bool) -> Self {
        Self([source, source, source, target, target, target])
    }

    pub fn from_mask(mask: [bool; 6]) -> Self {
        Self(mask)
    }

    pub fn with(mut self, param: PoseParam, wanted: bool) -> Self {
        self.0[param.index()] = wanted;
        self
    }

    pub fn contains(&self, param: PoseParam) -> bool {
        self.0[param.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| !w)
    }
}

/// Sparse column table returned by [`relative_pose_jacobian`].
///
/// Columns that were not requested are `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePoseJacobian {
    columns: [Option<Vec3>; 6],
}

impl RelativePoseJacobian {
    pub fn column(&self, param: PoseParam) -> Option<Vec3> {
        self.columns[param.index()]
    }

    /// `∂r_row/∂param`, if that column was computed.
    pub fn get(&self, row: usize, param: PoseParam) -> Option<Real> {
        self.column(param).and_then(|c| c.get(row).copied())
    }

    pub fn is_complete(&self) -> bool {
        self.columns.iter().all(Option::is_some)
    }

    /// Dense 3×6 block; columns that were not computed are zero.
    pub fn to_matrix(&self) -> SMatrix<Real, 3, 6> {
        let mut m = SMatrix::<Real, 3, 6>::zeros();
        for (j, col) in self.columns.iter().enumerate() {
            if let Some(col) = col {
                m.set_column(j, col);
            }
        }
        m
    }
}

/// Analytic Jacobian of [`super::relative_pose_residual`].
///
/// The observed pose does not enter the derivatives. Only the columns
/// selected by `request` are evaluated; each computed column has the same
/// value regardless of which others were requested.
pub fn relative_pose_jacobian(
    sqrt_information: &Mat3,
    source: &[Real; 3],
    target: &[Real; 3],
    request: JacobianRequest,
) -> RelativePoseJacobian {
    let mut columns = [None; 6];
    if request.is_empty() {
        return RelativePoseJacobian { columns };
    }

    let s_info = sqrt_information;
    let (s, c) = source[2].sin_cos();
    let dx = target[0] - source[0];
    let dy = target[1] - source[1];

    let d_source_x = || Vec3::from_fn(|i, _| s_info[(i, 0)] * c - s_info[(i, 1)] * s);
    let d_source_y = || Vec3::from_fn(|i, _| s_info[(i, 0)] * s + s_info[(i, 1)] * c);

    if request.contains(PoseParam::SourceX) || request.contains(PoseParam::TargetX) {
        let col = d_source_x();
        if request.contains(PoseParam::SourceX) {
            columns[PoseParam::SourceX.index()] = Some(col);
        }
        if request.contains(PoseParam::TargetX) {
            columns[PoseParam::TargetX.index()] = Some(-col);
        }
    }

    if request.contains(PoseParam::SourceY) || request.contains(PoseParam::TargetY) {
        let col = d_source_y();
        if request.contains(PoseParam::SourceY) {
            columns[PoseParam::SourceY.index()] = Some(col);
        }
        if request.contains(PoseParam::TargetY) {
            columns[PoseParam::TargetY.index()] = Some(-col);
        }
    }

    if request.contains(PoseParam::SourceTheta) {
        let u0 = s * dx - c * dy;
        let u1 = c * dx + s * dy;
        columns[PoseParam::SourceTheta.index()] = Some(Vec3::from_fn(|i, _| {
            s_info[(i, 0)] * u0 + s_info[(i, 1)] * u1 + s_info[(i, 2)]
        }));
    }

    if request.contains(PoseParam::TargetTheta) {
        columns[PoseParam::TargetTheta.index()] =
            Some(Vec3::from_fn(|i, _| -s_info[(i, 2)]));
    }

    RelativePoseJacobian { columns }
}
