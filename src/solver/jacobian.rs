//! Finite-difference Jacobian assembly
//!
//! # Mathematical Background
//!
//! For a residual `R(x)` with `n` components per cell, the Jacobian column of
//! primitive `p` is approximated by a one-sided difference:
//!
//! ```text
//!   J[e][p] ≈ (R_e(x + δ_p) − R_e(x)) / (x_p' − x_p)
//! ```
//!
//! with the perturbed value
//!
//! ```text
//!   x_p' = x_p + ε           if |x_p| < ε / 2
//!   x_p' = (1 + ε) x_p       otherwise
//! ```
//!
//! The same primitive is perturbed in **every** cell at once, so a whole
//! batch of per-cell `n × n` Jacobians costs `n` extra residual evaluations
//! instead of `n²` per cell. This captures the cell-diagonal block exactly
//! for residuals without neighbour coupling.
//!
//! # Storage
//!
//! Jacobian entries live in a [`GridField`] of `n²` variables, entry
//! `(e, p)` at variable `e + n·p`. [`pack_systems`] rearranges them (and
//! `−R`) into the per-cell layout of a [`SystemBatch`].

use ndarray::Zip;

use crate::physics::{GridField, ResidualModel};
use crate::solver::linear::{BatchSolution, SystemBatch};

/// Perturbed value of `x` for a finite-difference step `epsilon`
#[inline]
pub fn perturb(x: f64, epsilon: f64) -> f64 {
    if x.abs() < 0.5 * epsilon {
        x + epsilon
    } else {
        (1.0 + epsilon) * x
    }
}

/// Variable index of Jacobian entry `(equation, primitive)`
#[inline]
pub fn entry_index(n: usize, equation: usize, primitive: usize) -> usize {
    equation + n * primitive
}

/// Scratch fields reused across Jacobian assemblies
#[derive(Debug, Clone)]
pub struct JacobianWorkspace {
    /// Copy of the primitive guess, one variable perturbed at a time
    perturbed: GridField,

    /// Residual at the perturbed guess
    residual: GridField,

    /// `n²` Jacobian entries per cell
    jacobian: GridField,
}

impl JacobianWorkspace {
    pub fn new(primitive: &GridField, num_equations: usize) -> Self {
        let domain = *primitive.domain();
        Self {
            perturbed: primitive.clone(),
            residual: GridField::zeros(domain, num_equations),
            jacobian: GridField::zeros(domain, num_equations * num_equations),
        }
    }

    pub fn jacobian(&self) -> &GridField {
        &self.jacobian
    }

    /// Assemble the Jacobian of `model` at `primitive`
    ///
    /// `base_residual` must hold `R(primitive)`. The primitive guess itself is
    /// never written: each column perturbs a private copy, which is restored
    /// from `primitive` before the next column.
    pub fn assemble(
        &mut self,
        model: &dyn ResidualModel,
        primitive: &GridField,
        conserved: &GridField,
        base_residual: &GridField,
        epsilon: f64,
    ) -> &GridField {
        let n = model.num_equations();

        for var in 0..n {
            self.perturbed.copy_var_from(var, primitive, var);
        }

        for p in 0..n {
            self.perturbed.var_mut(p).mapv_inplace(|x| perturb(x, epsilon));
            model.compute_residual(&self.perturbed, conserved, &mut self.residual);

            for e in 0..n {
                let mut entry = self.jacobian.var_mut(entry_index(n, e, p));
                Zip::from(&mut entry)
                    .and(&self.residual.var(e))
                    .and(&base_residual.var(e))
                    .and(&self.perturbed.var(p))
                    .and(&primitive.var(p))
                    .for_each(|j, &r_pert, &r_base, &x_pert, &x| {
                        *j = (r_pert - r_base) / (x_pert - x);
                    });
            }

            self.perturbed.copy_var_from(p, primitive, p);
        }

        &self.jacobian
    }
}

/// Gather per-cell systems `J Δx = −R` for `cells` (total indices)
pub fn pack_systems(jacobian: &GridField, residual: &GridField, n: usize, cells: &[[usize; 3]]) -> SystemBatch {
    let mut batch = SystemBatch::zeros(cells.len(), n);

    for (c, &[i, j, k]) in cells.iter().enumerate() {
        for e in 0..n {
            for p in 0..n {
                batch.matrices[[c, e, p]] = jacobian.get(entry_index(n, e, p), i, j, k);
            }
            batch.rhs[[c, e]] = -residual.get(e, i, j, k);
        }
    }

    batch
}

/// Scatter per-cell corrections back to field layout
///
/// Failed cells receive a zero correction. Cells not listed are untouched.
pub fn unpack_correction(solution: &BatchSolution, cells: &[[usize; 3]], correction: &mut GridField) {
    let n = solution.x.ncols();
    for (c, &[i, j, k]) in cells.iter().enumerate() {
        for p in 0..n {
            let value = if solution.failed[c] { 0.0 } else { solution.x[[c, p]] };
            correction.set(p, i, j, k, value);
        }
    }
}
