//! End-to-end pose graph optimization tests.
//!
//! Validates:
//! - the triangle scenario converges to the consistent solution for both Jacobian modes,
//! - invalid graphs fail before any pose is modified,
//! - empty constraint lists are trivially solved,
//! - repeated runs are bit-for-bit identical,
//! - a perturbed ring with chords converges back to ground truth.

use spa_core::{normalize_angle, Pose2, Real};
use spa_optim::dataset::PoseGraphInput;
use spa_optim::{
    optimize_pose_graph, Constraint, JacobianMode, PoseGraphSolveOptions, PoseId, SpaError,
};
use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_2;

fn triangle() -> (Vec<Constraint>, BTreeMap<PoseId, Pose2>) {
    PoseGraphInput::triangle().to_graph().unwrap()
}

fn opts(jacobian: JacobianMode) -> PoseGraphSolveOptions {
    PoseGraphSolveOptions {
        jacobian,
        ..Default::default()
    }
}

fn assert_pose_close(actual: &Pose2, expected: &Pose2, tol: Real, what: &str) {
    let dx = (actual.x() - expected.x()).abs();
    let dy = (actual.y() - expected.y()).abs();
    let dth = normalize_angle(actual.angle() - expected.angle()).abs();
    assert!(
        dx < tol && dy < tol && dth < tol,
        "{}: got {:?}, expected {:?} (tol={})",
        what,
        actual,
        expected,
        tol
    );
}

#[test]
fn triangle_converges_for_both_jacobian_modes() {
    for mode in [JacobianMode::Analytic, JacobianMode::AutoDiff] {
        let (constraints, mut poses) = triangle();
        let summary = optimize_pose_graph(&constraints, &mut poses, &opts(mode)).unwrap();

        assert!(
            summary.final_cost < 1e-10,
            "{:?}: final cost too high: {}",
            mode,
            summary.final_cost
        );
        assert!(summary.initial_cost > summary.final_cost);
        assert_eq!(summary.num_residuals, 9);
        assert_eq!(summary.num_parameters, 9);
        assert_eq!(summary.num_effective_parameters, 6);
        assert!(summary.num_successful_steps > 0);
        assert!(summary.total_time_secs >= 0.0);

        assert_eq!(poses[&PoseId(0)], Pose2::identity(), "{:?}: anchor moved", mode);
        assert_pose_close(
            &poses[&PoseId(1)],
            &Pose2::new(4.0, 0.0, FRAC_PI_2),
            1e-3,
            "pose 1",
        );
        assert_pose_close(
            &poses[&PoseId(2)],
            &Pose2::new(0.0, 4.0, -FRAC_PI_2),
            1e-3,
            "pose 2",
        );
    }
}

#[test]
fn analytic_and_autodiff_agree_on_solution() {
    let (constraints, mut analytic) = triangle();
    let mut autodiff = analytic.clone();
    optimize_pose_graph(&constraints, &mut analytic, &opts(JacobianMode::Analytic)).unwrap();
    optimize_pose_graph(&constraints, &mut autodiff, &opts(JacobianMode::AutoDiff)).unwrap();
    for (id, pose) in &analytic {
        assert_pose_close(pose, &autodiff[id], 1e-6, "analytic vs autodiff");
    }
}

#[test]
fn missing_pose_fails_without_mutation() {
    let (mut constraints, mut poses) = triangle();
    constraints.push(Constraint::with_identity_information(
        PoseId(2),
        PoseId(5),
        Pose2::new(1.0, 0.0, 0.0),
    ));
    let before = poses.clone();

    let err = optimize_pose_graph(&constraints, &mut poses, &PoseGraphSolveOptions::default())
        .unwrap_err();
    assert!(matches!(err, SpaError::InvalidGraph(_)), "got {err}");
    assert_eq!(poses, before);
}

#[test]
fn missing_anchor_is_invalid() {
    let (constraints, mut poses) = triangle();
    let opts = PoseGraphSolveOptions {
        anchor: PoseId(42),
        ..Default::default()
    };
    let before = poses.clone();
    let err = optimize_pose_graph(&constraints, &mut poses, &opts).unwrap_err();
    assert!(matches!(err, SpaError::InvalidGraph(_)), "got {err}");
    assert_eq!(poses, before);
}

#[test]
fn empty_constraints_are_trivial() {
    let (_, mut poses) = triangle();
    let before = poses.clone();
    let summary = optimize_pose_graph(&[], &mut poses, &PoseGraphSolveOptions::default()).unwrap();
    assert_eq!(summary.num_residuals, 0);
    assert_eq!(summary.final_cost, 0.0);
    assert_eq!(summary.num_evaluations, 0);
    assert!(summary.converged);
    assert_eq!(poses, before);
}

#[test]
fn repeated_runs_are_identical() {
    let (constraints, poses) = triangle();
    let mut first = poses.clone();
    let mut second = poses;
    let a = optimize_pose_graph(&constraints, &mut first, &PoseGraphSolveOptions::default())
        .unwrap();
    let b = optimize_pose_graph(&constraints, &mut second, &PoseGraphSolveOptions::default())
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(a.final_cost.to_bits(), b.final_cost.to_bits());
    assert_eq!(a.num_evaluations, b.num_evaluations);
    assert_eq!(a.num_successful_steps, b.num_successful_steps);
}

#[test]
fn noisy_ring_recovers_ground_truth() {
    let (input, truth) = PoseGraphInput::noisy_ring(12, 4, 5);
    let (constraints, mut poses) = input.to_graph().unwrap();
    let summary =
        optimize_pose_graph(&constraints, &mut poses, &PoseGraphSolveOptions::default()).unwrap();

    assert!(summary.converged, "ring did not converge: {:?}", summary);
    assert!(summary.final_cost < 1e-10, "final cost {}", summary.final_cost);
    for (i, expected) in truth.iter().enumerate() {
        assert_pose_close(&poses[&PoseId(i)], expected, 1e-4, "ring pose");
    }
}

#[test]
fn information_weighting_is_respected() {
    // Two conflicting measurements of the same edge; the heavier one wins.
    let strong = spa_core::Mat3::identity() * 100.0;
    let constraints = vec![
        Constraint::new(PoseId(0), PoseId(1), Pose2::new(1.0, 0.0, 0.0), strong).unwrap(),
        Constraint::with_identity_information(PoseId(0), PoseId(1), Pose2::new(1.2, 0.0, 0.0)),
    ];
    let mut poses = BTreeMap::from([
        (PoseId(0), Pose2::identity()),
        (PoseId(1), Pose2::new(1.1, 0.0, 0.0)),
    ]);
    optimize_pose_graph(&constraints, &mut poses, &PoseGraphSolveOptions::default()).unwrap();
    let x = poses[&PoseId(1)].x();
    assert!(x > 1.0 && x < 1.01, "x = {}", x);
}
