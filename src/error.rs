//! Crate error type
//!
//! Cell-local numerical trouble (singular per-cell systems, unphysical closure
//! states, non-converged cells) is **not** an error: it degrades the status of
//! the affected cells and shows up in the solver reports. `SolverError` is
//! reserved for conditions that make the whole call meaningless: invalid
//! configuration, mismatched field shapes, and communication failures between
//! participants, which are fatal because every participant must see the same
//! global convergence state.

use thiserror::Error;

/// Errors raised by the solve engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// A configuration parameter is outside its admissible range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Two fields that must share a domain (or a variable count) do not
    #[error("Shape mismatch for {what}: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A field contains NaN or Inf where finite values are required
    #[error("Non-finite value in {field} at cell ({i}, {j}, {k}), variable {var}")]
    NonFinite {
        field: &'static str,
        var: usize,
        i: usize,
        j: usize,
        k: usize,
    },

    /// A collective exchange between participants failed
    #[error("Communication failure on rank {rank}: {reason}")]
    Communication { rank: usize, reason: String },
}

/// Convenience alias used across the crate
pub type SolverResult<T> = Result<T, SolverError>;
