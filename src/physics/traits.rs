//! Fluid variables and the residual-model trait
//!
//! This module defines the core API between the solve engine and the physics:
//! - `FluidVariable`: type-safe identifiers for primitive/conserved slots
//! - `ResidualModel`: trait for the (external) residual evaluator

use crate::physics::grid::GridField;

// =================================================================================================
// Fluid variables (Type-safe Identifiers)
// =================================================================================================

/// Primitive / conserved variable slots of an ideal-MHD state
///
/// The same slot numbering is used for primitive and conserved fields:
///
/// | Slot | Primitive                 | Conserved                 |
/// |------|---------------------------|---------------------------|
/// | 0    | rest-mass density ρ₀      | `g ρ₀ u^t`                |
/// | 1    | internal energy density u | `g T^t_t`                 |
/// | 2-4  | velocity ũ^i              | `g T^t_i`                 |
/// | 5-7  | magnetic field B^i        | `g B^i`                   |
///
/// The first [`FluidVariable::NUM_FLUID`] slots are the fluid equations
/// solved by the Newton corrector. The magnetic field is carried in the
/// same field and held fixed during primitive recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluidVariable {
    Rho,
    U,
    U1,
    U2,
    U3,
    B1,
    B2,
    B3,
}

impl FluidVariable {
    /// Number of fluid equations (density, energy, three momenta)
    pub const NUM_FLUID: usize = 5;

    /// Total number of slots including the magnetic field
    pub const DOF: usize = 8;

    pub const ALL: [FluidVariable; 8] = [
        FluidVariable::Rho,
        FluidVariable::U,
        FluidVariable::U1,
        FluidVariable::U2,
        FluidVariable::U3,
        FluidVariable::B1,
        FluidVariable::B2,
        FluidVariable::B3,
    ];

    /// Slot index inside a [`GridField`]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            FluidVariable::Rho => "rho",
            FluidVariable::U => "u",
            FluidVariable::U1 => "u1",
            FluidVariable::U2 => "u2",
            FluidVariable::U3 => "u3",
            FluidVariable::B1 => "B1",
            FluidVariable::B2 => "B2",
            FluidVariable::B3 => "B3",
        }
    }

    pub fn is_magnetic(self) -> bool {
        matches!(self, FluidVariable::B1 | FluidVariable::B2 | FluidVariable::B3)
    }
}

impl std::fmt::Display for FluidVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =================================================================================================
// Residual Model Trait
// =================================================================================================

/// Residual evaluator consumed by the Newton corrector
///
/// # Responsibility
///
/// Maps a primitive-state guess to the per-cell residual of the discrete
/// conservation laws against a target conserved state. The model provides the
/// "physics" (primitive → conserved map, fluxes, sources); the corrector
/// provides the "numerics" (how to drive the residual to zero).
///
/// # Contract
///
/// - Writes `num_equations()` variables of `residual` for every interior cell.
///   Halo values of `residual` are ignored by the corrector.
/// - Must be side-effect free from the corrector's point of view: the same
///   inputs give the same residual.
/// - May read neighbour (halo) cells of `primitive`; keeping halos current is
///   the caller's job.
///
/// The corrector calls this `n + 1` times for each Jacobian assembly and once
/// per line-search trial, so implementations should be cheap and should not
/// allocate per call where avoidable.
pub trait ResidualModel: Send + Sync {
    /// Number of equations per cell (`n` of the per-cell `n × n` system)
    fn num_equations(&self) -> usize;

    /// Number of primitive slots the model reads per cell
    ///
    /// At least [`num_equations`](Self::num_equations); slots past the
    /// solved ones are read but held fixed by the corrector.
    fn num_primitive_vars(&self) -> usize {
        self.num_equations()
    }

    /// Evaluate the residual at `primitive` against `conserved`
    fn compute_residual(&self, primitive: &GridField, conserved: &GridField, residual: &mut GridField);

    /// Name of the model (used to display and logging)
    fn name(&self) -> &str;

    /// Description of the model (optional)
    fn description(&self) -> Option<&str> {
        None
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_indices_are_contiguous() {
        for (expected, var) in FluidVariable::ALL.iter().enumerate() {
            assert_eq!(var.index(), expected);
            assert_eq!(FluidVariable::from_index(expected), Some(*var));
        }
        assert_eq!(FluidVariable::from_index(FluidVariable::DOF), None);
    }

    #[test]
    fn test_fluid_slots_precede_magnetic_slots() {
        let magnetic: Vec<_> = FluidVariable::ALL.iter().filter(|v| v.is_magnetic()).collect();
        assert_eq!(magnetic.len(), FluidVariable::DOF - FluidVariable::NUM_FLUID);
        assert!(magnetic.iter().all(|v| v.index() >= FluidVariable::NUM_FLUID));
    }

    #[test]
    fn test_display() {
        assert_eq!(FluidVariable::U2.to_string(), "u2");
        assert_eq!(format!("{}", FluidVariable::B3), "B3");
    }
}
