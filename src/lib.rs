//! rmhd-rs: implicit primitive recovery for relativistic MHD
//!
//! The nonlinear solve engine of an implicit time step for a relativistic
//! magnetized fluid on a structured grid: given the conserved state and a
//! primitive guess, recover primitives consistent with the conservation laws
//! and an ideal-gas closure under a curved-spacetime metric.
//!
//! # Architecture
//!
//! rmhd-rs is built on two core principles:
//!
//! 1. **Separation of Physics and Numerics**
//!    - Residual models define the equations (what to solve)
//!    - Solvers provide the methods (how to solve)
//!
//! 2. **Cell-local numerics, global decisions**
//!    - Every per-cell system is independent and solved in batches
//!    - Convergence is decided on the whole process group at once
//!
//! # Quick Start
//!
//! ```rust
//! use rmhd_rs::prelude::*;
//!
//! # fn main() -> Result<(), SolverError> {
//! let domain = GridDomain::line(8, 2)?;
//! let model = IdealMhdResidual::new(Minkowski, 4.0 / 3.0);
//!
//! // Target conserved state from a known primitive state
//! let exact = GridField::uniform(domain, &[1.0, 0.5, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0]);
//! let conserved = model.conserved_field(&exact);
//!
//! // Perturbed guess, corrected in place
//! let mut primitive = GridField::uniform(domain, &[1.1, 0.45, 0.12, 0.0, 0.0, 0.0, 0.0, 0.0]);
//! let config = NewtonConfiguration::default().with_tolerance(1e-20).with_max_iterations(20);
//! let corrector = NewtonCorrector::new(config, Box::new(SingleProcess))?;
//! let report = corrector.solve(&model, &conserved, &mut primitive)?;
//!
//! assert!(report.converged);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`physics`]: grid fields, fluid variables, geometry, residual-model trait
//! - [`models`]: residual models (ideal MHD)
//! - [`solver`]: Newton corrector, closure solver, batched linear solvers
//! - [`comm`]: process-group communication and convergence reduction
//! - [`error`]: crate error type

// Core modules
pub mod error;
pub mod physics;

pub mod comm;
pub mod models;
pub mod solver;

pub mod prelude {
    //! Convenient imports for common usage
    //!
    //! ```rust
    //! use rmhd_rs::prelude::*;
    //! ```
    pub use crate::comm::{Communicator, LocalCommunicator, SingleProcess};
    pub use crate::error::{SolverError, SolverResult};
    pub use crate::models::IdealMhdResidual;
    pub use crate::physics::{CellGeometry,
                             FluidVariable,
                             GridDomain,
                             GridField,
                             Metric,
                             Minkowski,
                             ResidualModel,
                             UniformMetric};
    pub use crate::solver::{ClosureConfiguration,
                            IdealClosure,
                            LinearSolverKind,
                            NewtonConfiguration,
                            NewtonCorrector,
                            NewtonReport,
                            NonlinearSolver};
}
