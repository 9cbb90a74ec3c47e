//! Deterministic synthetic pose-graph generation helpers.
//!
//! This module provides small building blocks for constructing synthetic
//! pose graphs used in tests and benchmarks:
//! - ground-truth trajectories ([`ring`]),
//! - exact relative measurements between trajectory poses,
//! - deterministic pseudo-random perturbation of initial estimates ([`noise`]).
//!
//! All generators take explicit seeds and produce stable orderings.
//!
//! # Example
//!
//! ```
//! use spa_core::synthetic::{noise::UniformPoseNoise, ring};
//!
//! let truth = ring::circle_trajectory(8, 5.0);
//! let edges = ring::odometry_edges(truth.len(), true);
//! let measurements = ring::relative_measurements(&truth, &edges);
//! assert_eq!(measurements.len(), 8);
//!
//! let noise = UniformPoseNoise { seed: 7, max_abs_xy: 0.2, max_abs_theta: 0.05 };
//! let initial = noise.perturb_all(&truth, 1);
//! assert_eq!(initial[0], truth[0]);
//! ```

pub mod noise;
pub mod ring;
