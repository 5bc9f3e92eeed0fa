//! Grid-wide Newton–Raphson corrector
//!
//! # Algorithm
//!
//! Each outer iteration:
//!
//! 1. Evaluate `R(x)` at the current primitive guess; per interior cell, form
//!    the local `Σ_e R_e²`
//! 2. Reduce across the process group: the 1-norm of all interior residual
//!    components and the count of cells whose `Σ_e R_e²` exceeds the
//!    absolute tolerance. Stop when the global count is zero.
//! 3. Assemble the per-cell Jacobians with `n` extra residual evaluations
//! 4. Solve `J Δx = −R` for every cell with the configured batched strategy
//! 5. Choose a per-cell step length by quadratic backtracking
//! 6. Update `x ← x + t Δx` in place
//!
//! # Failure policy
//!
//! - Budget exhausted: the best guess is kept, the report says
//!   `converged == false` and a warning is logged. After the last update the
//!   residual is evaluated and reduced once more, so the report always
//!   describes the returned guess.
//! - Singular per-cell system: that cell gets `Δx = 0` for the iteration and
//!   stays non-converged; the count shows up in the iteration record.
//! - Communication failure: returned as an error immediately.
//!
//! # Example
//!
//! ```rust,ignore
//! use rmhd_rs::prelude::*;
//!
//! let config = NewtonConfiguration::default().with_tolerance(1e-20);
//! let corrector = NewtonCorrector::new(config, Box::new(SingleProcess))?;
//! let report = corrector.solve(&model, &conserved, &mut primitive)?;
//! println!("{} iterations, |R| = {:e}", report.iterations, report.global_residual_norm);
//! ```

use std::time::Instant;

use log::{debug, info, warn};

use crate::comm::{Communicator, ConvergenceAggregator, GlobalConvergence, LocalConvergence};
use crate::error::{SolverError, SolverResult};
use crate::physics::{GridField, ResidualModel};
use crate::solver::jacobian::{pack_systems, unpack_correction, JacobianWorkspace};
use crate::solver::line_search::{apply_step, LineSearch};
use crate::solver::linear::{solver_for, BatchLinearSolver};
use crate::solver::traits::{
    IterationRecord, NewtonConfiguration, NewtonReport, NonlinearSolver, PhaseTimings,
};

/// Per-cell `Σ_e R_e²`, and the local convergence summary
pub fn local_convergence(
    residual: &GridField,
    n: usize,
    cells: &[[usize; 3]],
    absolute_tolerance: f64,
) -> (LocalConvergence, Vec<f64>) {
    let mut norm = 0.0;
    let mut unconverged = 0;
    let mut sum_squares = Vec::with_capacity(cells.len());

    for &[i, j, k] in cells {
        let mut l2 = 0.0;
        for e in 0..n {
            let r = residual.get(e, i, j, k);
            norm += r.abs();
            l2 += r * r;
        }
        // NaN counts as unconverged
        if !(l2 <= absolute_tolerance) {
            unconverged += 1;
        }
        sum_squares.push(l2);
    }

    (LocalConvergence { residual_norm: norm, unconverged }, sum_squares)
}

/// Newton corrector over a process group
pub struct NewtonCorrector {
    config: NewtonConfiguration,
    aggregator: ConvergenceAggregator,
    linear_solver: Box<dyn BatchLinearSolver>,
    line_search: LineSearch,
}

impl std::fmt::Debug for NewtonCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewtonCorrector")
            .field("config", &self.config)
            .field("aggregator", &self.aggregator)
            .field("linear_solver", &self.linear_solver.name())
            .finish()
    }
}

impl NewtonCorrector {
    /// Build a corrector; the linear strategy follows `config.linear_solver`
    pub fn new(config: NewtonConfiguration, comm: Box<dyn Communicator>) -> SolverResult<Self> {
        config.validate()?;

        let corrector = Self {
            linear_solver: solver_for(config.linear_solver),
            line_search: LineSearch::from_config(&config),
            aggregator: ConvergenceAggregator::new(comm),
            config,
        };

        if corrector.aggregator.is_coordinator() {
            info!(
                "Newton corrector: {} participant(s), linear solver {}, atol {:e}, {} iterations max",
                corrector.aggregator.size(),
                corrector.linear_solver.name(),
                corrector.config.absolute_tolerance,
                corrector.config.max_nonlinear_iterations
            );
        }

        Ok(corrector)
    }

    /// Replace the linear strategy (e.g. a device backend)
    pub fn with_linear_solver(mut self, linear_solver: Box<dyn BatchLinearSolver>) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    pub fn config(&self) -> &NewtonConfiguration {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.aggregator.rank()
    }

    fn evaluate(
        &self,
        model: &dyn ResidualModel,
        conserved: &GridField,
        primitive: &GridField,
        residual: &mut GridField,
        cells: &[[usize; 3]],
    ) -> SolverResult<(GlobalConvergence, Vec<f64>)> {
        let n = model.num_equations();
        model.compute_residual(primitive, conserved, residual);
        let (local, sum_squares) = local_convergence(residual, n, cells, self.config.absolute_tolerance);
        let global = self.aggregator.reduce(local)?;
        Ok((global, sum_squares))
    }
}

impl NonlinearSolver for NewtonCorrector {
    fn solve(
        &self,
        model: &dyn ResidualModel,
        conserved: &GridField,
        primitive: &mut GridField,
    ) -> SolverResult<NewtonReport> {
        let n = model.num_equations();
        if n == 0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "residual model '{}' declares no equations",
                model.name()
            )));
        }
        primitive.check_same_domain(conserved, "conserved")?;
        primitive.check_num_vars(model.num_primitive_vars().max(n), "primitive")?;
        conserved.check_num_vars(n, "conserved")?;
        conserved.check_finite(conserved.num_vars(), "conserved")?;

        let domain = *primitive.domain();
        let cells = domain.interior_cells();
        let coordinator = self.aggregator.is_coordinator();
        if coordinator {
            info!("Newton: {} on {domain}, {n} equations per cell", model.name());
        }

        let mut residual = GridField::zeros(domain, n);
        let mut correction = GridField::zeros(domain, n);
        let mut trial = primitive.clone();
        let mut trial_residual = GridField::zeros(domain, n);
        let mut workspace = JacobianWorkspace::new(primitive, n);

        let mut timings = PhaseTimings::default();
        let mut history = Vec::new();
        let mut singular_total = 0;
        let mut converged = false;
        let mut last = None;

        for iteration in 0..self.config.max_nonlinear_iterations {
            let (global, sum_squares) = self.evaluate(model, conserved, primitive, &mut residual, &cells)?;
            if coordinator {
                info!(
                    "[{iteration}] ||Residual|| = {:e}; {} pts haven't converged",
                    global.residual_norm, global.unconverged
                );
            }

            let mut record = IterationRecord {
                residual_norm: global.residual_norm,
                unconverged: global.unconverged,
                line_search_iterations: 0,
                singular_cells: 0,
            };
            last = Some(global);

            if global.converged() {
                history.push(record);
                converged = true;
                break;
            }

            // Jacobian
            let start = Instant::now();
            let jacobian = workspace.assemble(model, primitive, conserved, &residual, self.config.jacobian_epsilon);
            let batch = pack_systems(jacobian, &residual, n, &cells);
            timings.jacobian_assembly += start.elapsed();

            // Linear solve
            let start = Instant::now();
            let solution = self.linear_solver.solve(&batch);
            self.linear_solver.synchronize();
            timings.linear_solve += start.elapsed();

            unpack_correction(&solution, &cells, &mut correction);
            record.singular_cells = solution.num_failed();
            if record.singular_cells > 0 {
                singular_total += record.singular_cells;
                warn!(
                    "Rank {}: {} singular cell system(s) in iteration {iteration}, correction zeroed",
                    self.rank(),
                    record.singular_cells
                );
            }

            // Line search and update
            let start = Instant::now();
            let f0: Vec<f64> = sum_squares.iter().map(|s| 0.5 * s).collect();
            let mut step = vec![1.0; cells.len()];
            let outcome = self.line_search.run(
                model,
                conserved,
                primitive,
                &correction,
                &cells,
                &f0,
                &solution.failed,
                &mut trial,
                &mut trial_residual,
                &mut step,
            );
            apply_step(primitive, &correction, &step, n, &cells);
            timings.line_search += start.elapsed();

            record.line_search_iterations = outcome.iterations;
            debug!(
                "Rank {}: line search took {} trial(s), {} cell(s) still failing the decrease test",
                self.rank(),
                outcome.iterations,
                outcome.failing_cells
            );
            history.push(record);
        }

        // Budget exhausted: describe the guess actually returned
        if !converged {
            let (global, _) = self.evaluate(model, conserved, primitive, &mut residual, &cells)?;
            converged = global.converged();
            last = Some(global);

            if coordinator && !converged {
                warn!(
                    "Newton: iteration budget of {} exhausted, ||Residual|| = {:e}, {} pts haven't converged",
                    self.config.max_nonlinear_iterations, global.residual_norm, global.unconverged
                );
            }
        }

        debug!(
            "Rank {}: jacobian {:?}, linear solve {:?}, line search {:?}",
            self.rank(),
            timings.jacobian_assembly,
            timings.linear_solve,
            timings.line_search
        );

        let final_state = last.unwrap_or(GlobalConvergence { residual_norm: f64::NAN, unconverged: cells.len() });
        Ok(NewtonReport {
            iterations: history.len(),
            global_residual_norm: final_state.residual_norm,
            global_unconverged: final_state.unconverged,
            converged,
            singular_cells: singular_total,
            timings,
            history,
        })
    }

    fn name(&self) -> &str {
        "Grid-wide Newton-Raphson"
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcess;
    use crate::physics::GridDomain;
    use crate::solver::traits::LinearSolverKind;
    use approx::assert_relative_eq;

    /// R_e = x_e³ − c_e, uncoupled
    struct Cubic;

    impl ResidualModel for Cubic {
        fn num_equations(&self) -> usize {
            2
        }

        fn compute_residual(&self, prim: &GridField, cons: &GridField, residual: &mut GridField) {
            for [i, j, k] in prim.domain().interior_cells() {
                for e in 0..2 {
                    residual.set(e, i, j, k, prim.get(e, i, j, k).powi(3) - cons.get(e, i, j, k));
                }
            }
        }

        fn name(&self) -> &str {
            "cubic"
        }
    }

    fn corrector(kind: LinearSolverKind) -> NewtonCorrector {
        let config = NewtonConfiguration::default()
            .with_tolerance(1e-20)
            .with_max_iterations(30)
            .with_linear_solver(kind);
        NewtonCorrector::new(config, Box::new(SingleProcess)).unwrap()
    }

    #[test]
    fn test_local_convergence_counts_nan_as_unconverged() {
        let domain = GridDomain::line(3, 0).unwrap();
        let mut residual = GridField::zeros(domain, 1);
        residual.set(0, 1, 0, 0, 0.5);
        residual.set(0, 2, 0, 0, f64::NAN);

        let (local, l2) = local_convergence(&residual, 1, &domain.interior_cells(), 1e-3);
        assert_eq!(local.unconverged, 2);
        assert_eq!(l2[1], 0.25);
        assert!(local.residual_norm.is_nan());
    }

    #[test]
    fn test_cubic_roots_with_both_strategies() {
        for kind in [LinearSolverKind::HostDirect, LinearSolverKind::DeviceBatched] {
            let domain = GridDomain::line(4, 1).unwrap();
            let conserved = GridField::from_fn(domain, 2, |e, i, _, _| (1.0 + i as f64 + e as f64).powi(3));
            // Start above the roots, where full Newton steps are accepted
            let mut primitive = GridField::from_fn(domain, 2, |e, i, _, _| 1.2 * (1.0 + i as f64 + e as f64));

            let report = corrector(kind).solve(&Cubic, &conserved, &mut primitive).unwrap();

            assert!(report.converged, "{kind:?} did not converge: {report:?}");
            assert_eq!(report.global_unconverged, 0);
            for [i, j, k] in domain.interior_cells() {
                for e in 0..2 {
                    assert_relative_eq!(primitive.get(e, i, j, k), 1.0 + i as f64 + e as f64, epsilon = 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_halo_is_never_updated() {
        let domain = GridDomain::line(2, 2).unwrap();
        let conserved = GridField::uniform(domain, &[8.0, 27.0]);
        let mut primitive = GridField::uniform(domain, &[2.4, 3.6]);

        corrector(LinearSolverKind::HostDirect).solve(&Cubic, &conserved, &mut primitive).unwrap();

        assert_eq!(primitive.get(0, 0, 0, 0), 2.4);
        assert_eq!(primitive.get(1, 5, 0, 0), 3.6);
        assert_relative_eq!(primitive.get(1, 2, 0, 0), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_mismatched_fields() {
        let conserved = GridField::zeros(GridDomain::line(4, 1).unwrap(), 2);
        let mut primitive = GridField::zeros(GridDomain::line(5, 1).unwrap(), 2);
        let result = corrector(LinearSolverKind::HostDirect).solve(&Cubic, &conserved, &mut primitive);
        assert!(matches!(result, Err(SolverError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_short_conserved_field() {
        let domain = GridDomain::line(4, 1).unwrap();
        let conserved = GridField::zeros(domain, 1);
        let mut primitive = GridField::uniform(domain, &[1.0, 1.0]);
        let result = corrector(LinearSolverKind::HostDirect).solve(&Cubic, &conserved, &mut primitive);
        assert!(matches!(result, Err(SolverError::ShapeMismatch { what: "conserved", .. })));
    }

    #[test]
    fn test_rejects_primitive_field_without_magnetic_slots() {
        use crate::models::IdealMhdResidual;
        use crate::physics::{FluidVariable, Minkowski};

        let domain = GridDomain::line(3, 1).unwrap();
        let model = IdealMhdResidual::new(Minkowski, 4.0 / 3.0);
        let conserved = GridField::uniform(domain, &[1.0, -1.5, 0.0, 0.0, 0.0]);
        let mut primitive = GridField::uniform(domain, &[1.0, 0.5, 0.0, 0.0, 0.0]);

        let result = corrector(LinearSolverKind::HostDirect).solve(&model, &conserved, &mut primitive);
        match result {
            Err(SolverError::ShapeMismatch { what, expected, found }) => {
                assert_eq!(what, "primitive");
                assert_eq!(expected, vec![FluidVariable::DOF]);
                assert_eq!(found, vec![FluidVariable::NUM_FLUID]);
            }
            other => panic!("expected a shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let config = NewtonConfiguration::default().with_max_iterations(0);
        assert!(NewtonCorrector::new(config, Box::new(SingleProcess)).is_err());
    }
}
