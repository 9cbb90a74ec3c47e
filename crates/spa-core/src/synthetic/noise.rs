//! Deterministic noise helpers for synthetic pose graphs.
//!
//! Per-pose noise is derived from a stable integer hash of `(seed, index)` so
//! that perturbations do not depend on the internal algorithm of `rand` RNGs
//! and stay identical across versions and platforms.

use crate::{Pose2, Real};

/// Deterministic uniform pose noise.
///
/// Translation components are perturbed in `[-max_abs_xy, +max_abs_xy]`,
/// the heading in `[-max_abs_theta, +max_abs_theta]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPoseNoise {
    /// Base seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Maximum absolute per-axis translation noise.
    pub max_abs_xy: Real,
    /// Maximum absolute heading noise (radians).
    pub max_abs_theta: Real,
}

impl Default for UniformPoseNoise {
    fn default() -> Self {
        Self {
            seed: 0,
            max_abs_xy: 0.0,
            max_abs_theta: 0.0,
        }
    }
}

impl UniformPoseNoise {
    /// Sample a deterministic `[dx, dy, dθ]` offset for a pose index.
    #[inline]
    pub fn sample(&self, pose_idx: usize) -> [Real; 3] {
        let key = mix_key(self.seed, pose_idx);
        let u = u64_to_unit_f64(splitmix64(key));
        let v = u64_to_unit_f64(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
        let w = u64_to_unit_f64(splitmix64(key ^ 0xD6E8_FEB8_6659_FD93));

        // [0, 1) -> [-m, +m]
        let xy = self.max_abs_xy.abs();
        let th = self.max_abs_theta.abs();
        [(u - 0.5) * 2.0 * xy, (v - 0.5) * 2.0 * xy, (w - 0.5) * 2.0 * th]
    }

    /// Apply the offset for `pose_idx` to a pose (componentwise, in the reference frame).
    #[inline]
    pub fn apply(&self, pose_idx: usize, pose: &Pose2) -> Pose2 {
        let [dx, dy, dth] = self.sample(pose_idx);
        Pose2::new(pose.x() + dx, pose.y() + dy, pose.angle() + dth)
    }

    /// Perturb every pose except the first `keep_exact` ones.
    pub fn perturb_all(&self, poses: &[Pose2], keep_exact: usize) -> Vec<Pose2> {
        poses
            .iter()
            .enumerate()
            .map(|(i, p)| if i < keep_exact { *p } else { self.apply(i, p) })
            .collect()
    }
}

#[inline]
fn mix_key(seed: u64, pose_idx: usize) -> u64 {
    seed ^ (pose_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn u64_to_unit_f64(x: u64) -> Real {
    // top 53 bits -> [0, 1)
    let mantissa = x >> 11;
    (mantissa as Real) * (1.0 / ((1u64 << 53) as Real))
}
