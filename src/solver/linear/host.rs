//! Host-side direct solve, one pivoted LU per cell

use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Axis};

use super::{BatchLinearSolver, BatchSolution, SystemBatch, SINGULARITY_RATIO};
use crate::solver::map_indexed;

/// Per-cell partial-pivot LU via `nalgebra`
///
/// Cells are independent, so they are distributed across the rayon pool once
/// the batch exceeds [`crate::solver::parallel_threshold`] (with the
/// `parallel` feature).
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDirectSolver;

impl HostDirectSolver {
    /// Solve one `n × n` system, `None` when it is (near) singular
    fn solve_cell(batch: &SystemBatch, cell: usize) -> Option<Vec<f64>> {
        let n = batch.dim();
        let a = batch.matrices.index_axis(Axis(0), cell);
        let matrix = DMatrix::from_fn(n, n, |r, c| a[[r, c]]);
        let rhs = DVector::from_fn(n, |r, _| batch.rhs[[cell, r]]);

        let scale = matrix.amax();
        if !(scale > 0.0) || !scale.is_finite() {
            return None;
        }

        let lu = matrix.lu();
        let min_pivot = lu.u().diagonal().iter().fold(f64::INFINITY, |acc, p| acc.min(p.abs()));
        if min_pivot < SINGULARITY_RATIO * scale {
            return None;
        }

        let x = lu.solve(&rhs)?;
        if x.iter().all(|v| v.is_finite()) {
            Some(x.iter().copied().collect())
        } else {
            None
        }
    }
}

impl BatchLinearSolver for HostDirectSolver {
    fn solve(&self, batch: &SystemBatch) -> BatchSolution {
        let (cells, n) = (batch.num_cells(), batch.dim());
        let per_cell = map_indexed(cells, |cell| Self::solve_cell(batch, cell));

        let mut x = Array2::zeros((cells, n));
        let mut failed = vec![false; cells];
        for (cell, result) in per_cell.into_iter().enumerate() {
            match result {
                Some(values) => {
                    for (row, value) in values.into_iter().enumerate() {
                        x[[cell, row]] = value;
                    }
                }
                None => failed[cell] = true,
            }
        }

        BatchSolution { x, failed }
    }

    fn name(&self) -> &str {
        "host-direct LU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_system() {
        let mut batch = SystemBatch::zeros(1, 3);
        for d in 0..3 {
            batch.matrices[[0, d, d]] = 1.0;
            batch.rhs[[0, d]] = d as f64 - 1.0;
        }

        let solution = HostDirectSolver.solve(&batch);
        assert_eq!(solution.num_failed(), 0);
        assert_relative_eq!(solution.x[[0, 0]], -1.0);
        assert_relative_eq!(solution.x[[0, 2]], 1.0);
    }

    #[test]
    fn test_requires_pivoting() {
        // Zero leading entry: fails without row exchange
        let mut batch = SystemBatch::zeros(1, 2);
        batch.matrices[[0, 0, 1]] = 1.0;
        batch.matrices[[0, 1, 0]] = 1.0;
        batch.rhs[[0, 0]] = 2.0;
        batch.rhs[[0, 1]] = 3.0;

        let solution = HostDirectSolver.solve(&batch);
        assert!(!solution.failed[0]);
        assert_relative_eq!(solution.x[[0, 0]], 3.0, epsilon = 1e-14);
        assert_relative_eq!(solution.x[[0, 1]], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_singular_cell_is_flagged_and_zeroed() {
        let mut batch = SystemBatch::zeros(2, 2);
        // Cell 0: rank one
        batch.matrices[[0, 0, 0]] = 1.0;
        batch.matrices[[0, 0, 1]] = 2.0;
        batch.matrices[[0, 1, 0]] = 2.0;
        batch.matrices[[0, 1, 1]] = 4.0;
        batch.rhs[[0, 0]] = 1.0;
        // Cell 1: regular
        batch.matrices[[1, 0, 0]] = 4.0;
        batch.matrices[[1, 1, 1]] = 2.0;
        batch.rhs[[1, 0]] = 8.0;
        batch.rhs[[1, 1]] = 1.0;

        let solution = HostDirectSolver.solve(&batch);
        assert_eq!(solution.failed, vec![true, false]);
        assert_eq!(solution.x[[0, 0]], 0.0);
        assert_eq!(solution.x[[0, 1]], 0.0);
        assert_relative_eq!(solution.x[[1, 0]], 2.0);
        assert_relative_eq!(solution.x[[1, 1]], 0.5);
    }

    #[test]
    fn test_zero_matrix_is_singular() {
        let batch = SystemBatch::zeros(1, 4);
        assert!(HostDirectSolver.solve(&batch).failed[0]);
    }
}
