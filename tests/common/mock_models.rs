//! Mock residual models for testing
//!
//! Each model has a known root (or none at all), which makes it easy to
//! check what the Newton corrector did.

use rmhd_rs::physics::{GridField, ResidualModel};

// =================================================================================================
// Linear: R = x - c
// =================================================================================================

/// `R_e = x_e − c_e`, one cell at a time
///
/// Newton is exact after a single step.
pub struct LinearResidual {
    pub equations: usize,
}

impl LinearResidual {
    pub fn new(equations: usize) -> Self {
        Self { equations }
    }
}

impl ResidualModel for LinearResidual {
    fn num_equations(&self) -> usize {
        self.equations
    }

    fn compute_residual(&self, prim: &GridField, cons: &GridField, residual: &mut GridField) {
        for [i, j, k] in prim.domain().interior_cells() {
            for e in 0..self.equations {
                residual.set(e, i, j, k, prim.get(e, i, j, k) - cons.get(e, i, j, k));
            }
        }
    }

    fn name(&self) -> &str {
        "Linear"
    }
}

// =================================================================================================
// Coupled quadratic
// =================================================================================================

/// Two coupled equations with a closed-form Jacobian
///
/// ```text
///   R_0 = x_0² + x_1 − c_0
///   R_1 = x_0 x_1 − c_1
/// ```
pub struct CoupledQuadratic;

impl CoupledQuadratic {
    /// `∂R_e/∂x_p` at `(x0, x1)`
    pub fn jacobian(x0: f64, x1: f64) -> [[f64; 2]; 2] {
        [[2.0 * x0, 1.0], [x1, x0]]
    }

    /// Conserved values that make `(x0, x1)` an exact root
    pub fn target(x0: f64, x1: f64) -> [f64; 2] {
        [x0 * x0 + x1, x0 * x1]
    }
}

impl ResidualModel for CoupledQuadratic {
    fn num_equations(&self) -> usize {
        2
    }

    fn compute_residual(&self, prim: &GridField, cons: &GridField, residual: &mut GridField) {
        for [i, j, k] in prim.domain().interior_cells() {
            let (x0, x1) = (prim.get(0, i, j, k), prim.get(1, i, j, k));
            residual.set(0, i, j, k, x0 * x0 + x1 - cons.get(0, i, j, k));
            residual.set(1, i, j, k, x0 * x1 - cons.get(1, i, j, k));
        }
    }

    fn name(&self) -> &str {
        "Coupled quadratic"
    }
}

// =================================================================================================
// Kink: R = 1 + 10 |x - 1|
// =================================================================================================

/// A residual bounded away from zero with a kink at `x = 1`
///
/// Started on the kink, every Newton direction points uphill and the line
/// search must give up after its budget.
pub struct KinkResidual;

impl ResidualModel for KinkResidual {
    fn num_equations(&self) -> usize {
        1
    }

    fn compute_residual(&self, prim: &GridField, _cons: &GridField, residual: &mut GridField) {
        for [i, j, k] in prim.domain().interior_cells() {
            residual.set(0, i, j, k, 1.0 + 10.0 * (prim.get(0, i, j, k) - 1.0).abs());
        }
    }

    fn name(&self) -> &str {
        "Kink"
    }
}

// =================================================================================================
// Logarithm: R = ln x - c
// =================================================================================================

/// `R = ln x − c`, undefined for `x <= 0`
///
/// From `x = 3` the full Newton step lands on negative `x`, so the line
/// search has to pull the step back into the domain.
pub struct LogResidual;

impl ResidualModel for LogResidual {
    fn num_equations(&self) -> usize {
        1
    }

    fn compute_residual(&self, prim: &GridField, cons: &GridField, residual: &mut GridField) {
        for [i, j, k] in prim.domain().interior_cells() {
            residual.set(0, i, j, k, prim.get(0, i, j, k).ln() - cons.get(0, i, j, k));
        }
    }

    fn name(&self) -> &str {
        "Logarithm"
    }
}
