//! Relative-pose Jacobian via forward-mode automatic differentiation (`num-dual`).
//!
//! The local parameter vector is the six scalars `[x_s, y_s, θ_s, x_t, y_t, θ_t]`
//! of one residual block. The angle wrap offset is evaluated in `f64` at the
//! linearization point and enters the dual evaluation as a constant.

use crate::factors::relative_pose::{angle_wrap_offset, relative_pose_residual_generic};
use crate::factors::RelativePoseCost;
use nalgebra::{SMatrix, SVector};
use num_dual::{jacobian, DualSVec64};

/// Local parameter count of a relative-pose block.
pub const LOCAL_DIM: usize = 6;

fn build_local_params(source: &[f64; 3], target: &[f64; 3]) -> SVector<f64, LOCAL_DIM> {
    SVector::<f64, LOCAL_DIM>::from_column_slice(&[
        source[0], source[1], source[2], target[0], target[1], target[2],
    ])
}

/// 3×6 Jacobian of the whitened residual computed with dual numbers.
pub fn relative_pose_jacobian_ad(
    cost: &RelativePoseCost,
    source: &[f64; 3],
    target: &[f64; 3],
) -> SMatrix<f64, 3, LOCAL_DIM> {
    let p0_local = build_local_params(source, target);
    let theta_wrap = angle_wrap_offset(&cost.observed, source[2], target[2]);

    let (_r, j) = jacobian(
        |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
            relative_pose_residual_generic(
                p.as_slice(),
                &cost.observed,
                &cost.sqrt_information,
                theta_wrap,
            )
        },
        p0_local,
    );
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{relative_pose_jacobian, JacobianRequest};
    use spa_core::{Mat3, Pose2};

    #[test]
    fn autodiff_matches_analytic_on_fixed_sample() {
        let cost = RelativePoseCost::new(
            Pose2::new(0.5, 1.5, -2.0),
            Mat3::new(2.0, 0.1, 0.3, 0.0, 1.5, -0.2, 0.0, 0.0, 0.9),
        );
        let source = [1.0, -1.0, 0.8];
        let target = [-2.0, 0.5, 2.6];

        let ad = relative_pose_jacobian_ad(&cost, &source, &target);
        let analytic = relative_pose_jacobian(
            &cost.sqrt_information,
            &source,
            &target,
            JacobianRequest::all(),
        )
        .to_matrix();

        let err = (ad - analytic).amax();
        assert!(err < 1e-12, "autodiff vs analytic max diff {}", err);
    }

    #[test]
    fn autodiff_is_unaffected_by_angle_wrap() {
        // residual angle sits right next to the ±π seam
        let cost = RelativePoseCost::new(Pose2::new(0.0, 0.0, 3.1), Mat3::identity());
        let source = [0.0, 0.0, 0.0];
        let target = [0.0, 0.0, -0.1];
        let j = relative_pose_jacobian_ad(&cost, &source, &target);
        assert!((j[(2, 2)] - 1.0).abs() < 1e-15);
        assert!((j[(2, 5)] + 1.0).abs() < 1e-15);
    }
}
