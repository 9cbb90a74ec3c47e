//! Core 2-D geometry primitives for sparse pose adjustment.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Vec3`, `Mat3`, ...),
//! - angle wrapping ([`normalize_angle`]),
//! - the SE(2) [`Pose2`] type,
//! - deterministic synthetic pose-graph generators ([`synthetic`]).

/// Linear algebra type aliases and angle helpers.
pub mod math;
/// SE(2) rigid transforms.
pub mod pose;
/// Deterministic synthetic pose graphs for tests and benchmarks.
pub mod synthetic;

pub use math::*;
pub use pose::*;
