//! Physics-facing data model
//!
//! This module provides the types that the solve engine shares with the
//! (external) physics: grid fields, fluid variable slots, per-cell geometry
//! and the residual-model trait.
//!
//! # Core Concepts
//!
//! - **Grid Field**: dense `[variable, i, j, k]` array with a ghost halo
//! - **Fluid Variable**: type-safe slot identifier (`Rho`, `U`, `U1`, ...)
//! - **Cell Geometry**: lapse, volume factor and both forms of the metric
//! - **Residual Model**: maps a primitive guess to a per-cell residual
//!
//! # Architecture
//!
//! Residual models are **separate from the numerical solvers**:
//! - The model provides the **equations** (primitive → conserved, fluxes)
//! - The solver provides the **method** (Newton, line search, batched LU)
//!
//! # Implementing a New Residual Model
//!
//! ```rust,ignore
//! use rmhd_rs::physics::{GridField, ResidualModel};
//!
//! struct Decay { rate: f64 }
//!
//! impl ResidualModel for Decay {
//!     fn num_equations(&self) -> usize { 1 }
//!
//!     fn compute_residual(&self, prim: &GridField, cons: &GridField, residual: &mut GridField) {
//!         for [i, j, k] in prim.domain().interior_cells() {
//!             let r = self.rate * prim.get(0, i, j, k) - cons.get(0, i, j, k);
//!             residual.set(0, i, j, k, r);
//!         }
//!     }
//!
//!     fn name(&self) -> &str { "Decay" }
//! }
//! ```

// module declaration
pub mod geometry;
pub mod grid;
pub mod traits;

// re-export commonly used types for convenience
pub use geometry::{CellGeometry, Metric, Minkowski, UniformMetric, NDIM};
pub use grid::{GridDomain, GridField};
pub use traits::{FluidVariable, ResidualModel};
