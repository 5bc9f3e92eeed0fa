//! Residual models
//!
//! All models implement the [`ResidualModel`](crate::physics::ResidualModel)
//! trait. The Newton corrector calls `compute_residual` repeatedly per outer
//! iteration; models are responsible for the physics, the corrector for the
//! root finding.
//!
//! # Available Models
//!
//! ## [`IdealMhdResidual`]: local ideal-MHD conservation residual
//!
//! `U(P) − U_target` for density, energy and momenta on a metric, with an
//! ideal-gas equation of state. It has no neighbour coupling, so driving it
//! to zero is exactly the conserved → primitive inversion. The pointwise
//! forward map [`conserved_from_primitive`] is exposed for building targets
//! and for checking the closure solver.

// =================================================================================================
// Module Declarations
// =================================================================================================

pub mod ideal_mhd;

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use ideal_mhd::{conserved_from_primitive, IdealMhdResidual};
