use super::{CompiledProblem, OptimBackend, SolveOptions, SolveReport};
use crate::error::{Result, SpaError};
use crate::ir::{ParamArena, ProblemIR};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::{debug, warn};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use spa_core::Real;
use std::cell::Cell;

struct LmWrapper<'a, 'p> {
    problem: &'a CompiledProblem<'p>,
    params: DVector<Real>,
    /// Rows handed to the solver; zero rows pad underdetermined problems.
    rows: usize,
    best_cost: Cell<Real>,
    improvements: Cell<usize>,
}

impl<'a, 'p> LmWrapper<'a, 'p> {
    fn new(problem: &'a CompiledProblem<'p>, params: DVector<Real>) -> Self {
        let best = problem.cost(&params);
        Self {
            rows: problem.num_residuals().max(problem.num_free()),
            problem,
            params,
            best_cost: Cell::new(best),
            improvements: Cell::new(0),
        }
    }
}

impl LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, '_> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.params);
        let cost = 0.5 * r.norm_squared();
        if cost < self.best_cost.get() {
            self.best_cost.set(cost);
            self.improvements.set(self.improvements.get() + 1);
        }
        Some(r.resize_vertically(self.rows, 0.0))
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(
            self.problem
                .jacobian(&self.params)
                .resize_vertically(self.rows, 0.0),
        )
    }
}

/// Levenberg-Marquardt backend built on the `levenberg-marquardt` crate.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl OptimBackend for LmBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        arena: &mut ParamArena,
        opts: &SolveOptions,
    ) -> Result<SolveReport> {
        let problem = CompiledProblem::new(ir, arena)?;
        let x0 = problem.initial_params();
        let initial_cost = problem.cost(&x0);

        if problem.num_free() == 0 || problem.num_residuals() == 0 {
            debug!(
                "skipping solver: {} free scalars, {} residuals",
                problem.num_free(),
                problem.num_residuals()
            );
            return Ok(SolveReport::trivial(initial_cost));
        }

        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper::new(&problem, x0);
        let (wrapper, report) = lm.minimize(wrapper);
        let x_opt = wrapper.params();

        if x_opt.iter().any(|v| !v.is_finite()) {
            return Err(SpaError::Backend(format!(
                "non-finite parameters after {:?}",
                report.termination
            )));
        }

        let converged = report.termination.was_successful();
        let termination = format!("{:?}", report.termination);
        if !converged {
            warn!("Levenberg-Marquardt stopped without converging: {termination}");
        }

        problem.write_back(&x_opt, arena);
        Ok(SolveReport {
            evaluations: report.number_of_evaluations,
            successful_steps: wrapper.improvements.get(),
            initial_cost,
            final_cost: problem.cost(&x_opt),
            converged,
            termination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::RelativePoseCost;
    use crate::ir::{FactorKind, JacobianMode, ResidualBlock, RobustLoss};
    use spa_core::{Mat3, Pose2};

    fn single_edge_problem() -> (ProblemIR, ParamArena) {
        let mut ir = ProblemIR::new();
        let a = ir.add_param_block("pose/0", 3);
        let b = ir.add_param_block("pose/1", 3);
        let factor = FactorKind::RelativePose2 {
            cost: RelativePoseCost::new(Pose2::new(2.0, 1.0, 0.5), Mat3::identity()),
        };
        ir.add_residual_block(ResidualBlock {
            params: vec![a, b],
            loss: RobustLoss::Huber { scale: 1.0 },
            residual_dim: factor.residual_dim(),
            factor,
            jacobian: JacobianMode::Analytic,
        });
        ir.set_block_constant(a).unwrap();

        let mut arena = ParamArena::for_problem(&ir);
        arena.block_mut(b).unwrap().copy_from_slice(&[1.0, 0.0, 0.0]);
        (ir, arena)
    }

    #[test]
    fn lm_backend_solves_single_edge() {
        let (ir, mut arena) = single_edge_problem();
        let report = LmBackend
            .solve(&ir, &mut arena, &SolveOptions::default())
            .unwrap();

        let b = arena.block(crate::ir::ParamId(1)).unwrap();
        assert!((b[0] - 2.0).abs() < 1e-6, "x = {}", b[0]);
        assert!((b[1] - 1.0).abs() < 1e-6, "y = {}", b[1]);
        assert!((b[2] - 0.5).abs() < 1e-6, "theta = {}", b[2]);
        assert!(
            report.final_cost < 1e-12,
            "final cost too high: {}",
            report.final_cost
        );
        assert!(report.initial_cost > report.final_cost);
        assert!(report.converged, "did not converge: {:?}", report);
        assert!(report.evaluations > 0);
        assert!(report.successful_steps > 0);
    }

    #[test]
    fn max_iters_caps_evaluations_per_free_scalar() {
        let (ir, mut arena) = single_edge_problem();
        let opts = SolveOptions {
            max_iters: 1,
            ..SolveOptions::default()
        };
        let report = LmBackend.solve(&ir, &mut arena, &opts).unwrap();

        // three free scalars: at most max_iters * (3 + 1) evaluations
        let cap = opts.max_iters * (ir.num_effective_parameters() + 1);
        assert!(
            report.evaluations <= cap + 2,
            "{} evaluations exceed cap {}",
            report.evaluations,
            cap
        );
        assert!(report.successful_steps <= report.evaluations);
        assert!(report.final_cost <= report.initial_cost);
    }

    #[test]
    fn anchor_values_are_not_modified() {
        let (ir, mut arena) = single_edge_problem();
        arena
            .block_mut(crate::ir::ParamId(0))
            .unwrap()
            .copy_from_slice(&[0.25, -0.5, 0.1]);
        LmBackend
            .solve(&ir, &mut arena, &SolveOptions::default())
            .unwrap();
        assert_eq!(
            arena.block(crate::ir::ParamId(0)).unwrap(),
            &[0.25, -0.5, 0.1]
        );
    }

    #[test]
    fn fully_constant_problem_skips_solver() {
        let (mut ir, mut arena) = single_edge_problem();
        ir.set_block_constant(crate::ir::ParamId(1)).unwrap();
        let before = arena.clone();
        let report = LmBackend
            .solve(&ir, &mut arena, &SolveOptions::default())
            .unwrap();
        assert_eq!(report.evaluations, 0);
        assert_eq!(report.initial_cost, report.final_cost);
        assert_eq!(arena, before);
    }
}
