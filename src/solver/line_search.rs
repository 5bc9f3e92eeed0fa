//! Per-cell quadratic backtracking
//!
//! Along the Newton direction `Δx`, each cell minimises
//!
//! ```text
//!   f(t) = ½ Σ_e R_e(x + t Δx)²
//! ```
//!
//! from three pieces of information: `f(0)`, `f'(0) = −2 f(0)` (exact because
//! `t = 1` solves the linearised problem) and one trial value `f(t₀)`. A step
//! is accepted when
//!
//! ```text
//!   f(t₀) ≤ f(0) (1 − α t₀) + EPS
//! ```
//!
//! otherwise it is replaced by the minimiser of the quadratic through the
//! three values:
//!
//! ```text
//!   t₁ = −f'(0) t₀² / (2 (f(t₀) − f(0) − f'(0) t₀))
//! ```
//!
//! Steps start at 1 and only ever shrink. A trial that lands where the
//! residual is not finite halves the step; if the budget ends on such a
//! trial the cell does not move. Otherwise a degenerate quadratic (zero
//! denominator, or a minimiser outside `(0, t₀)`) leaves the step
//! unchanged.

use crate::physics::{GridField, ResidualModel};
use crate::solver::traits::NewtonConfiguration;

/// `½ Σ_e R_e²` of the first `n` residual components per cell
pub fn half_sum_squares(residual: &GridField, n: usize, cells: &[[usize; 3]]) -> Vec<f64> {
    cells
        .iter()
        .map(|&[i, j, k]| 0.5 * (0..n).map(|e| residual.get(e, i, j, k).powi(2)).sum::<f64>())
        .collect()
}

/// Counters of one backtracking run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSearchOutcome {
    /// Trial residual evaluations performed
    pub iterations: usize,

    /// Cells still failing the decrease test when the loop ended
    pub failing_cells: usize,
}

/// Backtracking parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    pub armijo_alpha: f64,
    pub floor: f64,
    pub max_iterations: usize,
}

impl LineSearch {
    pub fn from_config(config: &NewtonConfiguration) -> Self {
        Self {
            armijo_alpha: config.armijo_alpha,
            floor: config.line_search_floor,
            max_iterations: config.max_line_search_iterations,
        }
    }

    #[inline]
    pub fn sufficient_decrease(&self, f0: f64, f1: f64, step: f64) -> bool {
        f1 <= f0 * (1.0 - self.armijo_alpha * step) + self.floor
    }

    /// Minimiser of the quadratic model, or `step` when it is degenerate
    ///
    /// A non-finite trial value with a finite `f0` halves the step.
    #[inline]
    pub fn next_step(f0: f64, f1: f64, step: f64) -> f64 {
        if !f1.is_finite() && f0.is_finite() {
            return 0.5 * step;
        }

        let f_prime0 = -2.0 * f0;
        let denom = 2.0 * (f1 - f0 - f_prime0 * step);
        if denom == 0.0 || !denom.is_finite() {
            return step;
        }

        let next = -f_prime0 * step * step / denom;
        if next.is_finite() && next > 0.0 && next < step { next } else { step }
    }

    /// Shrink `step` cell by cell until every cell passes or the budget runs out
    ///
    /// `f0` holds `f(0)` per cell, `trial` and `trial_residual` are scratch
    /// fields. Cells marked in `frozen` (no usable direction) are skipped by
    /// the decrease test. When the budget is exhausted the last computed
    /// steps are left in `step`, including ones that were never evaluated,
    /// except that a cell whose final trial was non-finite gets a zero step.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        model: &dyn ResidualModel,
        conserved: &GridField,
        primitive: &GridField,
        correction: &GridField,
        cells: &[[usize; 3]],
        f0: &[f64],
        frozen: &[bool],
        trial: &mut GridField,
        trial_residual: &mut GridField,
        step: &mut [f64],
    ) -> LineSearchOutcome {
        let n = model.num_equations();
        let mut outcome = LineSearchOutcome { iterations: 0, failing_cells: 0 };

        trial.data_mut().assign(primitive.data());

        for iteration in 0..self.max_iterations {
            let last = iteration + 1 == self.max_iterations;

            for (c, &[i, j, k]) in cells.iter().enumerate() {
                for var in 0..n {
                    let x = primitive.get(var, i, j, k) + step[c] * correction.get(var, i, j, k);
                    trial.set(var, i, j, k, x);
                }
            }

            model.compute_residual(trial, conserved, trial_residual);
            let f1 = half_sum_squares(trial_residual, n, cells);
            outcome.iterations += 1;

            let mut failing = 0;
            for c in 0..cells.len() {
                if frozen[c] {
                    continue;
                }
                if !self.sufficient_decrease(f0[c], f1[c], step[c]) {
                    // Out of budget on a non-finite trial: stay put
                    step[c] = if last && !f1[c].is_finite() {
                        0.0
                    } else {
                        Self::next_step(f0[c], f1[c], step[c])
                    };
                    failing += 1;
                }
            }
            outcome.failing_cells = failing;

            if failing == 0 {
                break;
            }
        }

        outcome
    }
}

/// `x ← x + t Δx` on the first `n` variables of each listed cell
pub fn apply_step(primitive: &mut GridField, correction: &GridField, step: &[f64], n: usize, cells: &[[usize; 3]]) {
    for (c, &[i, j, k]) in cells.iter().enumerate() {
        for var in 0..n {
            let x = primitive.get(var, i, j, k) + step[c] * correction.get(var, i, j, k);
            primitive.set(var, i, j, k, x);
        }
    }
}
