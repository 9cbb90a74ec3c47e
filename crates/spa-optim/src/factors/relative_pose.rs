//! Whitened SE(2) relative-pose residual.

use nalgebra::{Matrix3, RealField, Vector3};
use spa_core::{normalize_angle, Mat3, Pose2, Real, Vec3};

/// Cost model for one relative-pose observation.
///
/// Holds the observed `source -> target` transform and the square-root
/// information factor, computed once per constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePoseCost {
    pub observed: Pose2,
    pub sqrt_information: Mat3,
}

impl RelativePoseCost {
    pub fn new(observed: Pose2, sqrt_information: Mat3) -> Self {
        Self {
            observed,
            sqrt_information,
        }
    }

    /// Whitened residual for flat `[x, y, θ]` source and target parameters.
    pub fn residual(&self, source: &[Real; 3], target: &[Real; 3]) -> Vec3 {
        relative_pose_residual(&self.observed, &self.sqrt_information, source, target)
    }

    pub fn residual_poses(&self, source: &Pose2, target: &Pose2) -> Vec3 {
        self.residual(&source.to_array(), &target.to_array())
    }

    /// Residual before whitening.
    pub fn unwhitened_residual(&self, source: &[Real; 3], target: &[Real; 3]) -> Vec3 {
        raw_residual(&self.observed, source, target)
    }
}

fn raw_residual(observed: &Pose2, source: &[Real; 3], target: &[Real; 3]) -> Vec3 {
    let (s, c) = source[2].sin_cos();
    let dx = target[0] - source[0];
    let dy = target[1] - source[1];
    let predicted_x = c * dx + s * dy;
    let predicted_y = c * dy - s * dx;
    let predicted_theta = target[2] - source[2];
    Vec3::new(
        observed.x() - predicted_x,
        observed.y() - predicted_y,
        normalize_angle(observed.angle() - predicted_theta),
    )
}

/// Whitened relative-pose residual `S * r`.
///
/// `r` is the observed relative pose minus the relative pose predicted from
/// `source` and `target`, expressed in the source frame, with the angle
/// component wrapped into `(-π, π]`.
pub fn relative_pose_residual(
    observed: &Pose2,
    sqrt_information: &Mat3,
    source: &[Real; 3],
    target: &[Real; 3],
) -> Vec3 {
    sqrt_information * raw_residual(observed, source, target)
}

/// Offset that maps the unwrapped angle residual onto its wrapped value.
///
/// It is an integer multiple of 2π and piecewise constant, so it carries no
/// derivative.
pub(crate) fn angle_wrap_offset(observed: &Pose2, source_theta: Real, target_theta: Real) -> Real {
    let raw = observed.angle() - (target_theta - source_theta);
    normalize_angle(raw) - raw
}

/// Generic residual evaluator for automatic differentiation.
///
/// `params` is `[x_s, y_s, θ_s, x_t, y_t, θ_t]`; `theta_wrap` comes from
/// [`angle_wrap_offset`] at the same linearization point.
pub(crate) fn relative_pose_residual_generic<T: RealField>(
    params: &[T],
    observed: &Pose2,
    sqrt_information: &Mat3,
    theta_wrap: Real,
) -> Vector3<T> {
    debug_assert!(params.len() == 6, "relative pose factor needs 6 scalars");

    let xs = params[0].clone();
    let ys = params[1].clone();
    let ths = params[2].clone();
    let xt = params[3].clone();
    let yt = params[4].clone();
    let tht = params[5].clone();

    let c = ths.clone().cos();
    let s = ths.clone().sin();
    let dx = xt - xs;
    let dy = yt - ys;
    let predicted_x = c.clone() * dx.clone() + s.clone() * dy.clone();
    let predicted_y = c * dy - s * dx;
    let predicted_theta = tht - ths;

    let ox: T = nalgebra::convert(observed.x());
    let oy: T = nalgebra::convert(observed.y());
    let oth: T = nalgebra::convert(observed.angle());
    let wrap: T = nalgebra::convert(theta_wrap);

    let r = Vector3::new(ox - predicted_x, oy - predicted_y, oth - predicted_theta + wrap);
    let s_t: Matrix3<T> = sqrt_information.map(nalgebra::convert::<Real, T>);
    s_t * r
}
