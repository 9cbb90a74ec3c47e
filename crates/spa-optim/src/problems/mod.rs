//! High-level optimization problems built on the IR and backends.

pub mod pose_graph;

pub use pose_graph::{
    build_pose_graph_ir, optimize_pose_graph, Constraint, PoseGraphProblem, PoseGraphSolveOptions,
    PoseGraphSummary, PoseId, HUBER_SCALE,
};
