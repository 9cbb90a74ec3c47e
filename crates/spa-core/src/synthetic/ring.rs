//! Ring-shaped ground-truth trajectories and their relative measurements.

use crate::{Pose2, Real};
use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use std::f64::consts::{FRAC_PI_2, TAU};

/// Exact relative measurement between two trajectory indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeMeasurement {
    pub source: usize,
    pub target: usize,
    pub relative_pose: Pose2,
}

/// `n` poses evenly spaced on a circle of `radius`, heading along the tangent.
///
/// Pose 0 is at `(radius, 0)` facing `+y`.
pub fn circle_trajectory(n: usize, radius: Real) -> Vec<Pose2> {
    (0..n)
        .map(|i| {
            let phi = TAU * i as Real / n.max(1) as Real;
            Pose2::new(
                radius * phi.cos(),
                radius * phi.sin(),
                crate::normalize_angle(phi + FRAC_PI_2),
            )
        })
        .collect()
}

/// Consecutive `i -> i+1` edges, optionally closing the loop `n-1 -> 0`.
pub fn odometry_edges(n: usize, close_loop: bool) -> Vec<(usize, usize)> {
    let mut edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
    if close_loop && n > 2 {
        edges.push((n - 1, 0));
    }
    edges
}

/// Up to `count` extra non-consecutive edges chosen with a seeded RNG.
///
/// Output is sorted so the edge order does not depend on sampling order.
pub fn random_chords(n: usize, count: usize, seed: u64) -> Vec<(usize, usize)> {
    let mut candidates = Vec::new();
    for i in 0..n {
        for j in (i + 2)..n {
            if !(i == 0 && j == n - 1) {
                candidates.push((i, j));
            }
        }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen: Vec<(usize, usize)> = candidates
        .choose_multiple(&mut rng, count.min(candidates.len()))
        .copied()
        .collect();
    chosen.sort_unstable();
    chosen
}

/// Exact measurements `truth[source].between(truth[target])` for each edge.
///
/// Edges referencing indices outside `truth` are skipped.
pub fn relative_measurements(
    truth: &[Pose2],
    edges: &[(usize, usize)],
) -> Vec<RelativeMeasurement> {
    edges
        .iter()
        .filter_map(|&(source, target)| {
            let a = truth.get(source)?;
            let b = truth.get(target)?;
            Some(RelativeMeasurement {
                source,
                target,
                relative_pose: a.between(b),
            })
        })
        .collect()
}
