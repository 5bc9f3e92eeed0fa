//! Solver traits, configuration and diagnostics
//!
//! # Design Philosophy
//!
//! - `NonlinearSolver` trait: one entry point that mutates a primitive guess
//!   in place given a conserved state, returning a diagnostics report
//! - `NewtonConfiguration`: read once at setup, never mutated by the solver
//! - `NewtonReport`: everything the caller needs to decide what to do about
//!   non-convergence (iterations, global norm, global count, phase timings)
//!
//! Phase timings are accumulated inside one call and returned in the report;
//! there are no process-wide timers.

use std::time::Duration;

use crate::error::{SolverError, SolverResult};
use crate::physics::{GridField, ResidualModel};

// =================================================================================================
// Nonlinear Solver Trait
// =================================================================================================

/// Solver that drives a residual model to zero by correcting primitives
///
/// # Contract
///
/// - `primitive` is mutated in place and is the only state that outlives the
///   call.
/// - Non-convergence is **not** an error: the best available guess is kept
///   and `NewtonReport::converged` is `false`.
/// - `Err` is reserved for invalid inputs (shape mismatch, configuration) and
///   communication failures.
pub trait NonlinearSolver {
    fn solve(
        &self,
        model: &dyn ResidualModel,
        conserved: &GridField,
        primitive: &mut GridField,
    ) -> SolverResult<NewtonReport>;

    /// Name of the solver (display and logging)
    fn name(&self) -> &str;
}

// =================================================================================================
// Linear Strategy Selection
// =================================================================================================

/// Batched linear-solve strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolverKind {
    /// Per-cell pivoted LU on the host, fanned out across threads
    #[default]
    HostDirect,

    /// One lane-wise elimination over an `n × n × cells` array
    DeviceBatched,
}

impl LinearSolverKind {
    pub fn name(&self) -> &str {
        match self {
            LinearSolverKind::HostDirect => "host-direct",
            LinearSolverKind::DeviceBatched => "device-batched",
        }
    }
}

// =================================================================================================
// Newton configuration
// =================================================================================================

/// Configuration of the grid-wide Newton corrector
///
/// # Examples
///
/// ```rust,ignore
/// let config = NewtonConfiguration::default()
///     .with_tolerance(1e-10)
///     .with_max_iterations(20)
///     .with_linear_solver(LinearSolverKind::DeviceBatched);
/// config.validate()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonConfiguration {
    /// Absolute tolerance on the per-cell sum of squared residuals
    pub absolute_tolerance: f64,

    /// Maximum outer Newton iterations
    pub max_nonlinear_iterations: usize,

    /// Maximum backtracking trials per outer iteration
    pub max_line_search_iterations: usize,

    /// Finite-difference step of the Jacobian (relative, absolute near zero)
    pub jacobian_epsilon: f64,

    /// Roundoff floor `EPS` of the sufficient-decrease test
    pub line_search_floor: f64,

    /// Armijo constant `α`
    pub armijo_alpha: f64,

    pub linear_solver: LinearSolverKind,
}

impl Default for NewtonConfiguration {
    fn default() -> Self {
        Self {
            absolute_tolerance: 1e-10,
            max_nonlinear_iterations: 10,
            max_line_search_iterations: 3,
            jacobian_epsilon: 4e-8,
            line_search_floor: 1e-15,
            armijo_alpha: 1e-4,
            linear_solver: LinearSolverKind::HostDirect,
        }
    }
}

impl NewtonConfiguration {
    pub fn with_tolerance(mut self, absolute_tolerance: f64) -> Self {
        self.absolute_tolerance = absolute_tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_nonlinear_iterations: usize) -> Self {
        self.max_nonlinear_iterations = max_nonlinear_iterations;
        self
    }

    pub fn with_max_line_search_iterations(mut self, max_line_search_iterations: usize) -> Self {
        self.max_line_search_iterations = max_line_search_iterations;
        self
    }

    pub fn with_jacobian_epsilon(mut self, jacobian_epsilon: f64) -> Self {
        self.jacobian_epsilon = jacobian_epsilon;
        self
    }

    pub fn with_armijo(mut self, armijo_alpha: f64, line_search_floor: f64) -> Self {
        self.armijo_alpha = armijo_alpha;
        self.line_search_floor = line_search_floor;
        self
    }

    pub fn with_linear_solver(mut self, linear_solver: LinearSolverKind) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> SolverResult<()> {
        if !(self.absolute_tolerance > 0.0) {
            return Err(SolverError::InvalidConfiguration(
                "absolute tolerance must be positive".to_string(),
            ));
        }
        if self.max_nonlinear_iterations == 0 {
            return Err(SolverError::InvalidConfiguration(
                "maximum nonlinear iterations must be positive".to_string(),
            ));
        }
        if !(self.jacobian_epsilon > 0.0 && self.jacobian_epsilon < 1.0) {
            return Err(SolverError::InvalidConfiguration(format!(
                "jacobian epsilon must lie in (0, 1), got {}",
                self.jacobian_epsilon
            )));
        }
        if !(self.armijo_alpha > 0.0 && self.armijo_alpha < 1.0) {
            return Err(SolverError::InvalidConfiguration(format!(
                "armijo constant must lie in (0, 1), got {}",
                self.armijo_alpha
            )));
        }
        if !(self.line_search_floor >= 0.0) || !self.line_search_floor.is_finite() {
            return Err(SolverError::InvalidConfiguration(
                "line search floor must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// =================================================================================================
// Closure configuration
// =================================================================================================

/// Configuration of the per-cell ideal-fluid closure
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureConfiguration {
    /// Adiabatic index Γ of the ideal-gas law `p = (Γ - 1) u`
    pub adiabatic_index: f64,

    /// Budget of secant passes after the initial Newton step
    pub secant_passes: usize,

    /// Early exit once `|err| <= tolerance · max(1, |Ep|)`
    pub tolerance: f64,

    /// Relative step of the derivative estimates
    pub derivative_step: f64,
}

impl Default for ClosureConfiguration {
    fn default() -> Self {
        Self {
            adiabatic_index: 4.0 / 3.0,
            secant_passes: 8,
            tolerance: 1e-12,
            derivative_step: 1e-5,
        }
    }
}

impl ClosureConfiguration {
    pub fn with_adiabatic_index(mut self, adiabatic_index: f64) -> Self {
        self.adiabatic_index = adiabatic_index;
        self
    }

    pub fn with_secant_passes(mut self, secant_passes: usize) -> Self {
        self.secant_passes = secant_passes;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_derivative_step(mut self, derivative_step: f64) -> Self {
        self.derivative_step = derivative_step;
        self
    }

    pub fn validate(&self) -> SolverResult<()> {
        if !(self.adiabatic_index > 1.0) {
            return Err(SolverError::InvalidConfiguration(format!(
                "adiabatic index must exceed 1, got {}",
                self.adiabatic_index
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(SolverError::InvalidConfiguration(
                "closure tolerance must be positive".to_string(),
            ));
        }
        if !(self.derivative_step > 0.0 && self.derivative_step < 0.1) {
            return Err(SolverError::InvalidConfiguration(format!(
                "derivative step must lie in (0, 0.1), got {}",
                self.derivative_step
            )));
        }
        Ok(())
    }
}

// =================================================================================================
// Diagnostics
// =================================================================================================

/// Wall-clock time spent in each phase of one corrector call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub jacobian_assembly: Duration,
    pub linear_solve: Duration,
    pub line_search: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.jacobian_assembly + self.linear_solve + self.line_search
    }
}

/// Diagnostics of one outer iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    /// Global 1-norm of the residual at the start of the iteration
    pub residual_norm: f64,

    /// Global count of cells above tolerance at the start of the iteration
    pub unconverged: usize,

    /// Backtracking trials spent (0 when the iteration converged)
    pub line_search_iterations: usize,

    /// Local cells whose linear system was singular
    pub singular_cells: usize,
}

/// Result of one corrector call
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonReport {
    /// Outer iterations in which a residual was evaluated and reduced
    pub iterations: usize,

    /// Final global residual 1-norm
    pub global_residual_norm: f64,

    /// Final global count of non-converged cells
    pub global_unconverged: usize,

    pub converged: bool,

    /// Local singular-cell total over all iterations
    pub singular_cells: usize,

    pub timings: PhaseTimings,

    pub history: Vec<IterationRecord>,
}

impl NewtonReport {
    /// Residual norms in iteration order
    pub fn residual_history(&self) -> Vec<f64> {
        self.history.iter().map(|record| record.residual_norm).collect()
    }
}

// =================================================================================================
// Tests
// =================================================================================================
