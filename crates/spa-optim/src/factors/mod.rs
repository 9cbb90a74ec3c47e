//! SE(2) relative-pose residual factors.
//!
//! The residual is evaluated in the frame of the source pose and whitened by
//! the upper-triangular square-root information `S` of the constraint.
//! Two derivative paths exist for the same residual:
//!
//! - [`relative_pose_jacobian`]: closed-form columns, one per scalar parameter,
//!   each independently optional;
//! - a generic [`nalgebra::RealField`] evaluator used with dual numbers by
//!   [`crate::jacobian_ad`].
//!
//! ## Key Guidelines
//!
//! - Parameter order is always `[x_s, y_s, θ_s, x_t, y_t, θ_t]`
//! - Convert constants with `nalgebra::convert`
//! - The angle wrap is a locally constant multiple of 2π; generic code adds it as a constant

pub mod relative_pose;
pub mod relative_pose_jacobian;

pub use relative_pose::{relative_pose_residual, RelativePoseCost};
pub use relative_pose_jacobian::{
    relative_pose_jacobian, JacobianRequest, PoseParam, RelativePoseJacobian,
};
