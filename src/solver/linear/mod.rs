//! Batched dense linear solvers
//!
//! One small dense system `A_c x_c = b_c` per grid cell, all of the same
//! dimension `n`. Two interchangeable strategies implement
//! [`BatchLinearSolver`]:
//!
//! - [`HostDirectSolver`]: pivoted LU per cell, cells fanned out across
//!   threads (no shared mutable state between cells)
//! - [`BatchedEliminationSolver`]: all systems reshaped into one
//!   `n × n × cells` array and eliminated lane-wise in a single pass, the way
//!   an accelerator batch solve works
//!
//! # Failure semantics
//!
//! A singular or near-singular system never leaks garbage: the cell's
//! solution is set to zero and `failed[c]` is raised. The caller decides what
//! a failed cell means (the Newton corrector leaves it untouched for that
//! iteration).

use ndarray::{Array2, Array3};

use crate::error::{SolverError, SolverResult};
use crate::solver::traits::LinearSolverKind;

mod batched;
mod host;

pub use batched::BatchedEliminationSolver;
pub use host::HostDirectSolver;

/// Pivot magnitude (relative to the largest entry of the matrix) below
/// which a system is declared singular
pub const SINGULARITY_RATIO: f64 = 1e-14;

// =================================================================================================
// Batch containers
// =================================================================================================

/// A batch of per-cell systems in array-of-structs layout
///
/// `matrices[[c, row, col]]` and `rhs[[c, row]]` for cell `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemBatch {
    pub matrices: Array3<f64>,
    pub rhs: Array2<f64>,
}

impl SystemBatch {
    pub fn zeros(num_cells: usize, n: usize) -> Self {
        Self {
            matrices: Array3::zeros((num_cells, n, n)),
            rhs: Array2::zeros((num_cells, n)),
        }
    }

    /// Build from existing arrays, checking their shapes agree
    pub fn new(matrices: Array3<f64>, rhs: Array2<f64>) -> SolverResult<Self> {
        let (cells, rows, cols) = matrices.dim();
        if rows != cols || rhs.dim() != (cells, rows) {
            return Err(SolverError::ShapeMismatch {
                what: "linear system batch",
                expected: vec![cells, rows, rows],
                found: vec![rhs.nrows(), rhs.ncols(), cols],
            });
        }
        Ok(Self { matrices, rhs })
    }

    pub fn num_cells(&self) -> usize {
        self.matrices.dim().0
    }

    /// Dimension `n` of each system
    pub fn dim(&self) -> usize {
        self.matrices.dim().1
    }
}

/// Per-cell solutions of a [`SystemBatch`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSolution {
    /// `x[[c, row]]`, zero for failed cells
    pub x: Array2<f64>,

    /// Cells whose system was singular or produced a non-finite solution
    pub failed: Vec<bool>,
}

impl BatchSolution {
    pub fn num_failed(&self) -> usize {
        self.failed.iter().filter(|&&f| f).count()
    }
}

// =================================================================================================
// Strategy trait
// =================================================================================================

/// Batched linear-solve strategy
pub trait BatchLinearSolver: Send + Sync {
    /// Solve every system of the batch
    fn solve(&self, batch: &SystemBatch) -> BatchSolution;

    /// Block until all submitted work has completed
    ///
    /// Strategies that dispatch asynchronously must override this; the
    /// corrector calls it before reading solutions or stopping a timer.
    fn synchronize(&self) {}

    fn name(&self) -> &str;
}

/// Strategy for a configured kind
pub fn solver_for(kind: LinearSolverKind) -> Box<dyn BatchLinearSolver> {
    match kind {
        LinearSolverKind::HostDirect => Box::new(HostDirectSolver),
        LinearSolverKind::DeviceBatched => Box::new(BatchedEliminationSolver),
    }
}

/// `‖A x − b‖₂ / ‖b‖₂` of one cell (absolute when `b = 0`)
pub fn relative_residual(batch: &SystemBatch, solution: &BatchSolution, cell: usize) -> f64 {
    let a = batch.matrices.index_axis(ndarray::Axis(0), cell);
    let b = batch.rhs.row(cell);
    let x = solution.x.row(cell);

    let r = a.dot(&x) - &b;
    let r_norm = r.dot(&r).sqrt();
    let b_norm = b.dot(&b).sqrt();
    if b_norm > 0.0 { r_norm / b_norm } else { r_norm }
}

// =================================================================================================
// Tests
// =================================================================================================
