//! JSON pose-graph datasets and built-in scenarios.

use crate::error::{Result, SpaError};
use crate::problems::{Constraint, PoseId};
use serde::{Deserialize, Serialize};
use spa_core::synthetic::{noise::UniformPoseNoise, ring};
use spa_core::{Mat3, Pose2, Real};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};

/// One pose estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub id: usize,
    pub x: Real,
    pub y: Real,
    pub theta: Real,
}

/// One relative-pose measurement. `information` is row-major; identity if omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub source: usize,
    pub target: usize,
    pub x: Real,
    pub y: Real,
    pub theta: Real,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<[[Real; 3]; 3]>,
}

/// Serializable pose graph: initial estimates plus constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseGraphInput {
    pub poses: Vec<PoseRecord>,
    pub constraints: Vec<ConstraintRecord>,
}

impl PoseRecord {
    pub fn pose(&self) -> Pose2 {
        Pose2::new(self.x, self.y, self.theta)
    }

    pub fn from_pose(id: PoseId, pose: &Pose2) -> Self {
        Self {
            id: id.0,
            x: pose.x(),
            y: pose.y(),
            theta: pose.angle(),
        }
    }
}

impl ConstraintRecord {
    pub fn to_constraint(&self) -> Result<Constraint> {
        let relative = Pose2::new(self.x, self.y, self.theta);
        let (source, target) = (PoseId(self.source), PoseId(self.target));
        match &self.information {
            Some(rows) => {
                Constraint::new(source, target, relative, Mat3::from_fn(|i, j| rows[i][j]))
            }
            None => Ok(Constraint::with_identity_information(source, target, relative)),
        }
    }

    pub fn from_constraint(c: &Constraint) -> Self {
        let info = c.information();
        let information = if *info == Mat3::identity() {
            None
        } else {
            Some([0usize, 1, 2].map(|i| [0usize, 1, 2].map(|j| info[(i, j)])))
        };
        Self {
            source: c.source().0,
            target: c.target().0,
            x: c.relative_pose().x(),
            y: c.relative_pose().y(),
            theta: c.relative_pose().angle(),
            information,
        }
    }
}

impl PoseGraphInput {
    /// Convert into constraints and a pose map.
    ///
    /// Duplicate pose ids are rejected with [`SpaError::InvalidGraph`].
    pub fn to_graph(&self) -> Result<(Vec<Constraint>, BTreeMap<PoseId, Pose2>)> {
        let mut poses = BTreeMap::new();
        for rec in &self.poses {
            if poses.insert(PoseId(rec.id), rec.pose()).is_some() {
                return Err(SpaError::InvalidGraph(format!(
                    "duplicate pose id {}",
                    rec.id
                )));
            }
        }
        let constraints = self
            .constraints
            .iter()
            .map(ConstraintRecord::to_constraint)
            .collect::<Result<Vec<_>>>()?;
        Ok((constraints, poses))
    }

    pub fn from_graph(constraints: &[Constraint], poses: &BTreeMap<PoseId, Pose2>) -> Self {
        Self {
            poses: poses
                .iter()
                .map(|(id, p)| PoseRecord::from_pose(*id, p))
                .collect(),
            constraints: constraints
                .iter()
                .map(ConstraintRecord::from_constraint)
                .collect(),
        }
    }

    /// Three poses forming a closed triangle, with perturbed estimates for poses 1 and 2.
    ///
    /// The consistent solution with pose 0 at the origin is
    /// `p1 = (4, 0, π/2)`, `p2 = (0, 4, -π/2)`.
    pub fn triangle() -> Self {
        let edge = |source, target, x, y, theta| ConstraintRecord {
            source,
            target,
            x,
            y,
            theta,
            information: None,
        };
        let pose = |id, x, y, theta| PoseRecord { id, x, y, theta };
        Self {
            poses: vec![
                pose(0, 0.0, 0.0, 0.0),
                pose(1, 4.3, -0.2, 1.4208),
                pose(2, -0.5, 4.4, -1.3708),
            ],
            constraints: vec![
                edge(0, 1, 4.0, 0.0, FRAC_PI_2),
                edge(1, 2, 4.0, 4.0, PI),
                edge(2, 0, 4.0, 0.0, FRAC_PI_2),
            ],
        }
    }

    /// Closed ring of `n` poses with `chords` extra edges and exact measurements.
    ///
    /// Initial estimates for every pose but the first are perturbed
    /// deterministically from `seed`. Returns the input and the ground truth.
    pub fn noisy_ring(n: usize, chords: usize, seed: u64) -> (Self, Vec<Pose2>) {
        let truth = ring::circle_trajectory(n, 10.0);
        let mut edges = ring::odometry_edges(n, true);
        edges.extend(ring::random_chords(n, chords, seed));
        let noise = UniformPoseNoise {
            seed,
            max_abs_xy: 0.3,
            max_abs_theta: 0.05,
        };
        let initial = noise.perturb_all(&truth, 1);

        let poses = initial
            .iter()
            .enumerate()
            .map(|(i, p)| PoseRecord::from_pose(PoseId(i), p))
            .collect();
        let constraints = ring::relative_measurements(&truth, &edges)
            .into_iter()
            .map(|m| ConstraintRecord {
                source: m.source,
                target: m.target,
                x: m.relative_pose.x(),
                y: m.relative_pose.y(),
                theta: m.relative_pose.angle(),
                information: None,
            })
            .collect();
        (Self { poses, constraints }, truth)
    }
}
