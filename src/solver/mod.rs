//! Nonlinear solve engine
//!
//! This module turns a conserved state and a primitive guess into a
//! primitive state consistent with the conservation laws.
//!
//! # Core Concepts
//!
//! ## The Architecture (WHAT vs HOW)
//!
//! 1. **Residual model** (`ResidualModel`) - WHAT to solve
//!    - maps a primitive guess to per-cell residuals
//!    - owns the physics (primitive → conserved map, fluxes)
//!
//! 2. **Configuration** (`NewtonConfiguration`, `ClosureConfiguration`) - HOW
//!    - tolerances, iteration budgets, finite-difference step
//!    - linear-solve strategy
//!
//! 3. **Solvers** - the numerical methods
//!    - `NewtonCorrector`: grid-wide Newton–Raphson with finite-difference
//!      Jacobian, batched linear solve and backtracking line search
//!    - `IdealClosure`: per-cell scalar inversion of the ideal-MHD
//!      conserved → primitive map
//!
//! # Module Organization
//!
//! - **`traits`**: `NonlinearSolver`, configuration and report types
//! - **`jacobian`**: finite-difference Jacobian assembly and batch packing
//! - **`line_search`**: per-cell quadratic backtracking
//! - **`linear`**: `BatchLinearSolver` strategies (host-direct, batched)
//! - **`newton`**: the outer Newton loop
//! - **`closure`**: ideal-fluid primitive recovery
//!
//! # Workflow Diagram
//!
//! ```text
//!          ┌──────────────────────┐
//!          │ residual at guess    │◄────────────────────────┐
//!          └──────────┬───────────┘                         │
//!                     │ per-cell Σ R², 1-norm               │
//!          ┌──────────▼───────────┐                         │
//!          │ convergence reduce   │── count == 0 ──► done   │
//!          └──────────┬───────────┘                         │
//!          ┌──────────▼───────────┐                         │
//!          │ FD Jacobian (n evals)│                         │
//!          └──────────┬───────────┘                         │
//!          ┌──────────▼───────────┐                         │
//!          │ batched J Δx = -R    │                         │
//!          └──────────┬───────────┘                         │
//!          ┌──────────▼───────────┐                         │
//!          │ line search, update  │─────────────────────────┘
//!          └──────────────────────┘
//! ```
//!
//! # Quick Start Example
//!
//! ```rust,ignore
//! use rmhd_rs::prelude::*;
//!
//! let corrector = NewtonCorrector::new(NewtonConfiguration::default(), Box::new(SingleProcess))?;
//! let report = corrector.solve(&model, &conserved, &mut primitive)?;
//! if !report.converged {
//!     log::warn!("{} cells left unconverged", report.global_unconverged);
//! }
//! ```

// =================================================================================================
// Module Declarations
// =================================================================================================
mod traits;
pub mod closure;
pub mod jacobian;
pub mod line_search;
pub mod linear;
pub mod newton;

// =================================================================================================
// Parallel Execution Threshold
// =================================================================================================
//
// The threshold is stored in an AtomicUsize so that benchmarks and tests can
// change it at runtime without a mutex on every per-cell map. Relaxed
// ordering is sufficient: the value is a performance hint, not a
// synchronisation point.
// =================================================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default number of cells above which per-cell work switches to rayon
const DEFAULT_PARALLEL_THRESHOLD: usize = 999;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Return the current parallel-execution threshold.
///
/// Per-cell maps (closure, residual model, host linear solve, lane updates)
/// run sequentially when they touch fewer cells than this value, and switch
/// to rayon above it, but only when the crate is compiled with the
/// `parallel` feature.
///
/// # Example
///
/// ```rust
/// use rmhd_rs::solver::parallel_threshold;
///
/// assert!(parallel_threshold() > 0);
/// ```
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Set the parallel-execution threshold to a new value.
///
/// # Panics
///
/// Panics when `threshold == 0`.
///
/// # Example
///
/// ```rust
/// use rmhd_rs::solver::{parallel_threshold, set_parallel_threshold};
///
/// let previous = parallel_threshold();
/// set_parallel_threshold(4096);
/// assert_eq!(parallel_threshold(), 4096);
/// set_parallel_threshold(previous);
/// ```
pub fn set_parallel_threshold(threshold: usize) {
    assert!(threshold > 0, "parallel threshold must be at least 1");
    PARALLEL_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// RAII guard that saves the current threshold on construction and restores
/// it on drop.
///
/// Only compiled in test builds.
#[cfg(test)]
pub(crate) struct ThresholdGuard {
    previous: usize,
}

#[cfg(test)]
impl ThresholdGuard {
    pub(crate) fn save(new_value: usize) -> Self {
        let previous = parallel_threshold();
        set_parallel_threshold(new_value);
        Self { previous }
    }
}

#[cfg(test)]
impl Drop for ThresholdGuard {
    fn drop(&mut self) {
        // Bypass the public setter so that restoring never panics
        PARALLEL_THRESHOLD.store(self.previous, Ordering::Relaxed);
    }
}

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use traits::{
    ClosureConfiguration,
    IterationRecord,
    LinearSolverKind,
    NewtonConfiguration,
    NewtonReport,
    NonlinearSolver,
    PhaseTimings,
};

pub use closure::{ClosureReport, IdealClosure};
pub use linear::{BatchLinearSolver, BatchSolution, BatchedEliminationSolver, HostDirectSolver, SystemBatch};
pub use newton::NewtonCorrector;

// =================================================================================================
// Helper Functions
// =================================================================================================

/// Map `f` over `0..len`, in index order
///
/// Uses rayon above [`parallel_threshold`] when the `parallel` feature is
/// enabled. Results are always collected in index order.
pub(crate) fn map_indexed<T, F>(len: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if len > parallel_threshold() {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            return (0..len).into_par_iter().map(f).collect();
        }
        #[cfg(not(feature = "parallel"))]
        return (0..len).map(f).collect();
    }
    (0..len).map(f).collect()
}

/// Map `f` over a list of cells (total indices), in list order
pub(crate) fn map_cells<T, F>(cells: &[[usize; 3]], f: F) -> Vec<T>
where
    T: Send,
    F: Fn([usize; 3]) -> T + Sync + Send,
{
    map_indexed(cells.len(), |c| f(cells[c]))
}

/// Effective memory bandwidth of repeated whole-grid passes, in GB/s
///
/// Every pass reads `num_reads` and writes `num_writes` double-precision
/// values per cell of a grid of `num_cells` cells (halo included).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rmhd_rs::solver::memory_bandwidth;
///
/// // 1e6 cells, 10 reads + 5 writes, 4 passes in 0.5 s
/// let gbs = memory_bandwidth(1_000_000, 10, 5, 4, Duration::from_millis(500));
/// assert!((gbs - 0.96).abs() < 1e-12);
/// ```
pub fn memory_bandwidth(
    num_cells: usize,
    num_reads: usize,
    num_writes: usize,
    num_evaluations: usize,
    elapsed: Duration,
) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    let bytes = num_cells as f64 * 8.0 * (num_reads + num_writes) as f64 * num_evaluations as f64;
    bytes / seconds / 1e9
}

// =================================================================================================
// Tests
// =================================================================================================
