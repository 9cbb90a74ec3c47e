//! Sparse pose adjustment for 2-D pose graphs.
//!
//! This crate provides the SE(2) relative-pose cost model, its closed-form and
//! dual-number Jacobians, and the assembly of pose graphs into a
//! least-squares problem solved by an external Levenberg-Marquardt backend.
//!
//! Layout:
//! - [`factors`]: residual and analytic Jacobian of a relative-pose observation,
//! - [`ir`]: backend-independent problem representation and parameter arena,
//! - [`backend`]: compilation of the IR and the solver adapter,
//! - [`problems`]: the pose graph entry point [`optimize_pose_graph`],
//! - [`dataset`]: JSON datasets and built-in scenarios.

pub mod backend;
pub mod dataset;
pub mod error;
pub mod factors;
pub mod information;
pub mod ir;
pub mod jacobian_ad;
pub mod problems;
pub mod robust;

pub use crate::backend::{SolveOptions, SolveReport};
pub use crate::error::{Result, SpaError};
pub use crate::ir::JacobianMode;
pub use crate::problems::pose_graph::{
    optimize_pose_graph, Constraint, PoseGraphSolveOptions, PoseGraphSummary, PoseId,
};
