//! Lane-wise batched Gaussian elimination
//!
//! # Layout
//!
//! The batch is reshaped so that the cell index is the fastest axis:
//!
//! ```text
//!   A : (n, n, cells)        A[[row, col, c]]
//!   b : (n, 1, cells)        b[[row, 0, c]]
//! ```
//!
//! Every row operation then acts on one contiguous lane of `cells` values,
//! which is the shape a single accelerator batch-solve call consumes. Pivot
//! selection is the only per-lane step; elimination and back substitution
//! are whole-lane array operations.

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayViewMut2, Axis, Zip};

use super::{BatchLinearSolver, BatchSolution, SystemBatch, SINGULARITY_RATIO};
use crate::solver::parallel_threshold;

/// Batched elimination with per-lane partial pivoting
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchedEliminationSolver;

impl BatchedEliminationSolver {
    /// `(cells, n, n)` → `(n, n, cells)` and `(cells, n)` → `(n, 1, cells)`
    fn to_lanes(batch: &SystemBatch) -> (Array3<f64>, Array3<f64>) {
        let a = batch.matrices.view().permuted_axes([1, 2, 0]).as_standard_layout().into_owned();
        let b = batch
            .rhs
            .view()
            .reversed_axes()
            .insert_axis(Axis(1))
            .as_standard_layout()
            .into_owned();
        (a, b)
    }
}

/// `target -= factor * pivot_row`, broadcasting `factor` over columns
fn eliminate(target: ArrayViewMut2<'_, f64>, pivot_row: ArrayView2<'_, f64>, factor: &Array1<f64>) {
    let zip = Zip::from(target).and(pivot_row).and_broadcast(factor);

    if factor.len() > parallel_threshold() {
        #[cfg(feature = "parallel")]
        zip.par_for_each(|t, &p, &f| *t -= f * p);
        #[cfg(not(feature = "parallel"))]
        zip.for_each(|t, &p, &f| *t -= f * p);
    } else {
        zip.for_each(|t, &p, &f| *t -= f * p);
    }
}

impl BatchLinearSolver for BatchedEliminationSolver {
    fn solve(&self, batch: &SystemBatch) -> BatchSolution {
        let (cells, n) = (batch.num_cells(), batch.dim());
        let (mut a, mut b) = Self::to_lanes(batch);

        // Per-lane scale for the singularity test
        let scale: Vec<f64> = (0..cells)
            .map(|c| a.slice(s![.., .., c]).iter().fold(0.0f64, |acc, v| acc.max(v.abs())))
            .collect();
        let mut failed: Vec<bool> = scale.iter().map(|&s| !(s > 0.0) || !s.is_finite()).collect();

        for k in 0..n {
            // Partial pivoting, lane by lane
            for c in 0..cells {
                let mut pivot = k;
                for row in k + 1..n {
                    if a[[row, k, c]].abs() > a[[pivot, k, c]].abs() {
                        pivot = row;
                    }
                }
                if pivot != k {
                    for col in 0..n {
                        a.swap([k, col, c], [pivot, col, c]);
                    }
                    b.swap([k, 0, c], [pivot, 0, c]);
                }
                if !(a[[k, k, c]].abs() >= SINGULARITY_RATIO * scale[c]) || failed[c] {
                    failed[c] = true;
                    // Placeholder pivot keeps the lane finite; the result is discarded
                    a[[k, k, c]] = 1.0;
                }
            }

            for row in k + 1..n {
                let factor: Array1<f64> = &a.slice(s![row, k, ..]) / &a.slice(s![k, k, ..]);

                let (target, pivot_row) = a.multi_slice_mut((s![row, k.., ..], s![k, k.., ..]));
                eliminate(target, pivot_row.view(), &factor);

                let (b_target, b_pivot) = b.multi_slice_mut((s![row, .., ..], s![k, .., ..]));
                eliminate(b_target, b_pivot.view(), &factor);
            }
        }

        // Back substitution on whole lanes
        let mut x = Array2::<f64>::zeros((n, cells));
        for k in (0..n).rev() {
            let mut acc = b.slice(s![k, 0, ..]).to_owned();
            for col in k + 1..n {
                acc = acc - &(&a.slice(s![k, col, ..]) * &x.row(col));
            }
            acc /= &a.slice(s![k, k, ..]);
            x.row_mut(k).assign(&acc);
        }

        // Back to (cells, n); failed or non-finite lanes are zeroed
        let mut x = x.reversed_axes().as_standard_layout().into_owned();
        for (c, mut lane) in x.axis_iter_mut(Axis(0)).enumerate() {
            if failed[c] || lane.iter().any(|v| !v.is_finite()) {
                failed[c] = true;
                lane.fill(0.0);
            }
        }

        self.synchronize();
        BatchSolution { x, failed }
    }

    fn name(&self) -> &str {
        "batched elimination"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::ThresholdGuard;
    use approx::assert_relative_eq;

    fn diagonal_batch(cells: usize, n: usize) -> SystemBatch {
        let mut batch = SystemBatch::zeros(cells, n);
        for c in 0..cells {
            for d in 0..n {
                batch.matrices[[c, d, d]] = (c + d + 1) as f64;
                batch.rhs[[c, d]] = 1.0;
            }
        }
        batch
    }

    #[test]
    fn test_lane_layout() {
        let mut batch = SystemBatch::zeros(2, 2);
        batch.matrices[[1, 0, 1]] = 7.0;
        batch.rhs[[1, 1]] = 3.0;

        let (a, b) = BatchedEliminationSolver::to_lanes(&batch);
        assert_eq!(a.dim(), (2, 2, 2));
        assert_eq!(b.dim(), (2, 1, 2));
        assert_eq!(a[[0, 1, 1]], 7.0);
        assert_eq!(b[[1, 0, 1]], 3.0);
    }

    #[test]
    fn test_diagonal_systems() {
        let batch = diagonal_batch(4, 3);
        let solution = BatchedEliminationSolver.solve(&batch);

        assert_eq!(solution.num_failed(), 0);
        for c in 0..4 {
            for d in 0..3 {
                assert_relative_eq!(solution.x[[c, d]], 1.0 / (c + d + 1) as f64, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_per_lane_pivoting() {
        // Lane 0 needs a row exchange, lane 1 does not
        let mut batch = SystemBatch::zeros(2, 2);
        batch.matrices[[0, 0, 1]] = 1.0;
        batch.matrices[[0, 1, 0]] = 1.0;
        batch.rhs[[0, 0]] = 5.0;
        batch.rhs[[0, 1]] = 6.0;

        batch.matrices[[1, 0, 0]] = 2.0;
        batch.matrices[[1, 1, 1]] = 4.0;
        batch.rhs[[1, 0]] = 2.0;
        batch.rhs[[1, 1]] = 2.0;

        let solution = BatchedEliminationSolver.solve(&batch);
        assert_relative_eq!(solution.x[[0, 0]], 6.0);
        assert_relative_eq!(solution.x[[0, 1]], 5.0);
        assert_relative_eq!(solution.x[[1, 0]], 1.0);
        assert_relative_eq!(solution.x[[1, 1]], 0.5);
    }

    #[test]
    fn test_singular_lane_does_not_poison_neighbours() {
        let mut batch = diagonal_batch(3, 2);
        batch.matrices[[1, 1, 1]] = 0.0;

        let solution = BatchedEliminationSolver.solve(&batch);
        assert_eq!(solution.failed, vec![false, true, false]);
        assert_eq!(solution.x[[1, 0]], 0.0);
        assert_relative_eq!(solution.x[[2, 1]], 0.25);
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let batch = diagonal_batch(64, 4);
        let sequential = BatchedEliminationSolver.solve(&batch);

        let _guard = ThresholdGuard::save(8);
        let parallel = BatchedEliminationSolver.solve(&batch);
        assert_eq!(sequential, parallel);
    }
}
