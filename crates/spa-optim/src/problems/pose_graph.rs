//! 2-D pose graph optimization (sparse pose adjustment).
//!
//! Each constraint becomes one [`FactorKind::RelativePose2`] residual block
//! wrapped in a Huber loss. One pose, the anchor, is held constant to remove
//! the three gauge freedoms of a graph made of relative measurements only.
//!
//! The whole graph is validated before anything is handed to the solver, so
//! an invalid graph never leaves poses partially updated.

use crate::backend::{solve_with_backend, BackendKind, SolveOptions, SolveReport};
use crate::error::{Result, SpaError};
use crate::factors::RelativePoseCost;
use crate::information::sqrt_information;
use crate::ir::{
    FactorKind, JacobianMode, ParamArena, ParamId, ProblemIR, ResidualBlock, RobustLoss,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use spa_core::{normalize_angle, Mat3, Pose2};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

/// Huber scale attached to every relative-pose residual.
pub const HUBER_SCALE: f64 = 1.0;

/// Identifier of a pose in the graph.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PoseId(pub usize);

impl fmt::Display for PoseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observed rigid transform from `source`'s frame to `target`'s frame.
///
/// The square-root information is factored once here and reused by every
/// residual evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    source: PoseId,
    target: PoseId,
    relative_pose: Pose2,
    information: Mat3,
    sqrt_information: Mat3,
}

impl Constraint {
    /// Fails with [`SpaError::SingularInformation`] if `information` is not
    /// symmetric positive semi-definite.
    pub fn new(
        source: PoseId,
        target: PoseId,
        relative_pose: Pose2,
        information: Mat3,
    ) -> Result<Self> {
        let sqrt_information = sqrt_information(&information)?;
        Ok(Self {
            source,
            target,
            relative_pose,
            information,
            sqrt_information,
        })
    }

    /// Constraint with unit information.
    pub fn with_identity_information(
        source: PoseId,
        target: PoseId,
        relative_pose: Pose2,
    ) -> Self {
        Self {
            source,
            target,
            relative_pose,
            information: Mat3::identity(),
            sqrt_information: Mat3::identity(),
        }
    }

    pub fn source(&self) -> PoseId {
        self.source
    }

    pub fn target(&self) -> PoseId {
        self.target
    }

    pub fn relative_pose(&self) -> &Pose2 {
        &self.relative_pose
    }

    pub fn information(&self) -> &Mat3 {
        &self.information
    }

    pub fn sqrt_information(&self) -> &Mat3 {
        &self.sqrt_information
    }

    pub fn cost(&self) -> RelativePoseCost {
        RelativePoseCost::new(self.relative_pose, self.sqrt_information)
    }
}

/// Options for [`optimize_pose_graph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseGraphSolveOptions {
    /// Pose held constant during the solve.
    pub anchor: PoseId,
    /// Jacobian source for every residual block.
    pub jacobian: JacobianMode,
    pub backend: BackendKind,
    pub solver: SolveOptions,
}

impl Default for PoseGraphSolveOptions {
    fn default() -> Self {
        Self {
            anchor: PoseId(0),
            jacobian: JacobianMode::Analytic,
            backend: BackendKind::LevenbergMarquardt,
            solver: SolveOptions::default(),
        }
    }
}

/// Solve diagnostics for one pose graph optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseGraphSummary {
    pub jacobian: JacobianMode,
    /// Wall-clock time spent in the solver, seconds.
    pub total_time_secs: f64,
    pub num_residual_blocks: usize,
    pub num_residuals: usize,
    pub num_parameters: usize,
    pub num_effective_parameters: usize,
    pub num_successful_steps: usize,
    pub num_evaluations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    pub termination: String,
}

/// Assembled pose graph ready for a backend.
#[derive(Debug, Clone)]
pub struct PoseGraphProblem {
    pub ir: ProblemIR,
    pub arena: ParamArena,
    /// Pose behind each parameter block, indexed by [`ParamId`].
    pub pose_ids: Vec<PoseId>,
}

impl PoseGraphProblem {
    pub fn param_of(&self, pose: PoseId) -> Option<ParamId> {
        self.pose_ids.binary_search(&pose).ok().map(ParamId)
    }
}

fn check_graph(
    constraints: &[Constraint],
    poses: &BTreeMap<PoseId, Pose2>,
    anchor: PoseId,
) -> Result<()> {
    if !poses.contains_key(&anchor) {
        return Err(SpaError::InvalidGraph(format!(
            "anchor pose {anchor} is not in the pose map"
        )));
    }
    for (idx, c) in constraints.iter().enumerate() {
        for id in [c.source, c.target] {
            if !poses.contains_key(&id) {
                return Err(SpaError::InvalidGraph(format!(
                    "constraint {idx} ({} -> {}) references missing pose {id}",
                    c.source, c.target
                )));
            }
        }
    }
    Ok(())
}

/// Build the IR for a pose graph.
///
/// Parameter blocks are created for the anchor and for every pose referenced
/// by a constraint, in ascending id order. Poses no constraint touches are
/// left out and therefore never modified.
pub fn build_pose_graph_ir(
    constraints: &[Constraint],
    poses: &BTreeMap<PoseId, Pose2>,
    opts: &PoseGraphSolveOptions,
) -> Result<PoseGraphProblem> {
    check_graph(constraints, poses, opts.anchor)?;

    let used: BTreeSet<PoseId> = constraints
        .iter()
        .flat_map(|c| [c.source, c.target])
        .chain(std::iter::once(opts.anchor))
        .collect();
    let pose_ids: Vec<PoseId> = used.into_iter().collect();

    let mut ir = ProblemIR::new();
    for id in &pose_ids {
        ir.add_param_block(format!("pose/{id}"), 3);
    }
    let problem_param = |id: PoseId| -> Result<ParamId> {
        pose_ids
            .binary_search(&id)
            .map(ParamId)
            .map_err(|_| SpaError::InvalidGraph(format!("pose {id} has no parameter block")))
    };

    for c in constraints {
        let factor = FactorKind::RelativePose2 { cost: c.cost() };
        ir.add_residual_block(ResidualBlock {
            params: vec![problem_param(c.source)?, problem_param(c.target)?],
            loss: RobustLoss::Huber { scale: HUBER_SCALE },
            residual_dim: factor.residual_dim(),
            factor,
            jacobian: opts.jacobian,
        });
    }

    let anchor = problem_param(opts.anchor)?;
    ir.set_block_constant(anchor)?;

    let mut arena = ParamArena::for_problem(&ir);
    for (idx, id) in pose_ids.iter().enumerate() {
        if let (Some(pose), Some(slot)) = (poses.get(id), arena.block_mut(ParamId(idx))) {
            slot.copy_from_slice(&pose.to_array());
        }
    }

    debug!(
        "assembled pose graph: {} poses, {} constraints, anchor {}",
        pose_ids.len(),
        constraints.len(),
        opts.anchor
    );

    Ok(PoseGraphProblem {
        ir,
        arena,
        pose_ids,
    })
}

/// Optimize `poses` in place against `constraints`.
///
/// On success every pose that appears in a constraint, except the anchor,
/// holds its optimized value with the heading wrapped into `(-π, π]`. On
/// error no pose is modified.
pub fn optimize_pose_graph(
    constraints: &[Constraint],
    poses: &mut BTreeMap<PoseId, Pose2>,
    opts: &PoseGraphSolveOptions,
) -> Result<PoseGraphSummary> {
    let PoseGraphProblem {
        ir,
        mut arena,
        pose_ids,
    } = build_pose_graph_ir(constraints, poses, opts)?;

    let start = Instant::now();
    let report = solve_with_backend(opts.backend, &ir, &mut arena, &opts.solver)?;
    let total_time_secs = start.elapsed().as_secs_f64();

    for (idx, id) in pose_ids.iter().enumerate() {
        if *id == opts.anchor {
            continue;
        }
        if let (Some(pose), Some(values)) = (poses.get_mut(id), arena.block(ParamId(idx))) {
            *pose = Pose2::new(values[0], values[1], normalize_angle(values[2]));
        }
    }

    let summary = summarize(&ir, opts.jacobian, total_time_secs, report);
    log_summary(&summary, opts.solver.verbose);
    Ok(summary)
}

fn summarize(
    ir: &ProblemIR,
    jacobian: JacobianMode,
    total_time_secs: f64,
    report: SolveReport,
) -> PoseGraphSummary {
    PoseGraphSummary {
        jacobian,
        total_time_secs,
        num_residual_blocks: ir.residuals.len(),
        num_residuals: ir.num_residuals(),
        num_parameters: ir.num_parameters(),
        num_effective_parameters: ir.num_effective_parameters(),
        num_successful_steps: report.successful_steps,
        num_evaluations: report.evaluations,
        initial_cost: report.initial_cost,
        final_cost: report.final_cost,
        converged: report.converged,
        termination: report.termination,
    }
}

fn log_summary(summary: &PoseGraphSummary, verbose: bool) {
    let level = if verbose {
        log::Level::Info
    } else {
        log::Level::Debug
    };
    log::log!(
        level,
        "used {:?} jacobian: total time {:.6}s, residuals {}, parameters {} ({} effective), \
         successful steps {}, initial/final cost {:e} / {:e}",
        summary.jacobian,
        summary.total_time_secs,
        summary.num_residuals,
        summary.num_parameters,
        summary.num_effective_parameters,
        summary.num_successful_steps,
        summary.initial_cost,
        summary.final_cost
    );
    if verbose && !summary.converged {
        info!("solver termination: {}", summary.termination);
    }
}
