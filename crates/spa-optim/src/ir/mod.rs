//! Backend-independent intermediate representation of pose-graph problems.

mod arena;
mod types;

pub use arena::ParamArena;
pub use types::{
    FactorKind, FixedMask, JacobianMode, ParamBlock, ParamId, ProblemIR, ResidualBlock,
    RobustLoss,
};
