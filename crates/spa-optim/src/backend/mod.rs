//! Backend adapters that compile the IR into solver-specific problems.
//!
//! Backends translate the IR into a dense least-squares problem over the free
//! scalars, drive the external solver, and write the optimized values back
//! into the [`ParamArena`]. Values are only written back when the solver
//! returns finite parameters.

mod compiled;
mod lm;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ir::{ParamArena, ProblemIR};

pub use compiled::CompiledProblem;
pub use lm::LmBackend;

/// Backend-agnostic solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Iteration budget, passed to the solver as its patience. The solver caps
    /// residual evaluations at roughly `max_iters * (free scalars + 1)`.
    pub max_iters: usize,
    /// Relative cost decrease tolerance.
    pub ftol: f64,
    /// Relative step size tolerance.
    pub xtol: f64,
    /// Gradient orthogonality tolerance.
    pub gtol: f64,
    /// Log the solve summary at `info` level instead of `debug`.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            verbose: false,
        }
    }
}

/// Solve diagnostics reported by a backend.
///
/// Costs are `½ Σ ρ(||r_i||²)` over all residual blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Residual evaluations performed by the solver.
    pub evaluations: usize,
    /// Evaluations that lowered the best cost seen so far.
    ///
    /// The solver does not expose its accepted steps, so this counts cost
    /// improvements instead. It approximates the accepted-step count.
    pub successful_steps: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Whether the solver stopped on a convergence criterion.
    pub converged: bool,
    /// Solver-specific termination reason.
    pub termination: String,
}

impl SolveReport {
    /// Report for a problem the solver never has to touch.
    pub(crate) fn trivial(cost: f64) -> Self {
        Self {
            evaluations: 0,
            successful_steps: 0,
            initial_cost: cost,
            final_cost: cost,
            converged: true,
            termination: "nothing to optimize".to_string(),
        }
    }
}

/// Backend interface implemented by solver adapters.
pub trait OptimBackend {
    /// Solve `ir` starting from, and writing back into, `arena`.
    fn solve(
        &self,
        ir: &ProblemIR,
        arena: &mut ParamArena,
        opts: &SolveOptions,
    ) -> Result<SolveReport>;
}

/// Supported solver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// `levenberg-marquardt` crate (MINPACK-style trust region).
    #[default]
    LevenbergMarquardt,
}

/// Solve a problem using the selected backend.
pub fn solve_with_backend(
    backend: BackendKind,
    ir: &ProblemIR,
    arena: &mut ParamArena,
    opts: &SolveOptions,
) -> Result<SolveReport> {
    match backend {
        BackendKind::LevenbergMarquardt => LmBackend.solve(ir, arena, opts),
    }
}
