//! Ideal-MHD conservation residual
//!
//! # Physical background
//!
//! For an ideal magnetized fluid with rest-mass density ρ₀, internal energy
//! density u and ideal-gas pressure `p = (Γ − 1) u`, the stress-energy tensor is
//!
//! $$T^\mu{}_\nu = (\rho_0 + u + p + b^2)\, u^\mu u_\nu + (p + \tfrac12 b^2)\,\delta^\mu{}_\nu - b^\mu b_\nu$$
//!
//! and the evolved (conserved) quantities are the time components, densitized
//! by `g = √(-det g_{μν})`:
//!
//! ```text
//!   U_rho = g ρ₀ u^t
//!   U_μ   = g T^t_μ            (μ = t, 1, 2, 3)
//!   U_B^i = g B^i
//! ```
//!
//! # Primitive velocity
//!
//! Velocities are stored as ũ^i, the spatial 4-velocity seen by the normal
//! observer. With `γ = √(1 + ũ_i ũ^i)`:
//!
//! ```text
//!   u^t = γ / α
//!   u^i = ũ^i − γ α g^{ti}
//! ```
//!
//! # Magnetic 4-vector
//!
//! ```text
//!   b^t = B^i u_i
//!   b^i = (B^i + b^t u^i) / u^t
//! ```
//!
//! # Residual
//!
//! [`IdealMhdResidual`] evaluates `U(P) − U_target` for the five fluid
//! equations in every interior cell. It is purely local (no neighbour
//! coupling), which makes it the reference problem for the implicit primitive
//! recovery: driving its residual to zero is exactly inverting the
//! conserved → primitive map.

use crate::physics::geometry::{dot, CellGeometry, Metric, NDIM};
use crate::physics::{FluidVariable, GridField, ResidualModel};
use crate::solver::map_cells;

// =================================================================================================
// Pointwise forward map
// =================================================================================================

/// Conserved variables of one cell from its primitive variables
///
/// `prim` must hold the eight slots of [`FluidVariable`] in order. The
/// result uses the same slot layout.
pub fn conserved_from_primitive(
    prim: &[f64],
    geom: &CellGeometry,
    adiabatic_index: f64,
) -> [f64; FluidVariable::DOF] {
    use FluidVariable::*;

    let rho = prim[Rho.index()];
    let u = prim[U.index()];
    let pressure = (adiabatic_index - 1.0) * u;

    // Normal-observer velocity and Lorentz factor
    let u_tilde_con = [0.0, prim[U1.index()], prim[U2.index()], prim[U3.index()]];
    let u_tilde_sqr = dot(&geom.lower(&u_tilde_con), &u_tilde_con);
    let gamma = (1.0 + u_tilde_sqr.abs()).sqrt();

    let alpha = geom.lapse;
    let mut ucon = [0.0; NDIM];
    ucon[0] = gamma / alpha;
    for i in 1..NDIM {
        ucon[i] = u_tilde_con[i] - gamma * alpha * geom.gcon[0][i];
    }
    let ucov = geom.lower(&ucon);

    // Magnetic 4-vector
    let b_prim = [prim[B1.index()], prim[B2.index()], prim[B3.index()]];
    let mut bcon = [0.0; NDIM];
    bcon[0] = (0..3).map(|i| b_prim[i] * ucov[i + 1]).sum();
    for i in 1..NDIM {
        bcon[i] = (b_prim[i - 1] + bcon[0] * ucon[i]) / ucon[0];
    }
    let bcov = geom.lower(&bcon);
    let b_sqr = dot(&bcov, &bcon);

    let enthalpy_total = rho + u + pressure + b_sqr;
    let pressure_total = pressure + 0.5 * b_sqr;

    let mut cons = [0.0; FluidVariable::DOF];
    cons[Rho.index()] = geom.g * rho * ucon[0];
    for mu in 0..NDIM {
        let delta = if mu == 0 { 1.0 } else { 0.0 };
        cons[U.index() + mu] =
            geom.g * (enthalpy_total * ucon[0] * ucov[mu] + pressure_total * delta - bcon[0] * bcov[mu]);
    }
    for i in 0..3 {
        cons[B1.index() + i] = geom.g * b_prim[i];
    }

    cons
}

// =================================================================================================
// Residual model
// =================================================================================================

/// Local ideal-MHD residual `U(P) − U_target` on a metric
#[derive(Debug, Clone)]
pub struct IdealMhdResidual<M: Metric> {
    metric: M,
    adiabatic_index: f64,
}

impl<M: Metric> IdealMhdResidual<M> {
    pub fn new(metric: M, adiabatic_index: f64) -> Self {
        Self { metric, adiabatic_index }
    }

    pub fn adiabatic_index(&self) -> f64 {
        self.adiabatic_index
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Conserved field implied by `primitive` on every cell (halo included)
    pub fn conserved_field(&self, primitive: &GridField) -> GridField {
        let domain = *primitive.domain();
        let mut conserved = GridField::zeros(domain, FluidVariable::DOF);
        let [t1, t2, t3] = domain.total_extents();

        for k in 0..t3 {
            for j in 0..t2 {
                for i in 0..t1 {
                    let geom = self.metric.geometry_at(i, j, k);
                    let cons = conserved_from_primitive(&primitive.cell(i, j, k), &geom, self.adiabatic_index);
                    conserved.set_cell(i, j, k, &cons);
                }
            }
        }
        conserved
    }
}

impl<M: Metric> ResidualModel for IdealMhdResidual<M> {
    fn num_equations(&self) -> usize {
        FluidVariable::NUM_FLUID
    }

    fn num_primitive_vars(&self) -> usize {
        FluidVariable::DOF
    }

    fn compute_residual(&self, primitive: &GridField, conserved: &GridField, residual: &mut GridField) {
        let cells = primitive.domain().interior_cells();
        let n = FluidVariable::NUM_FLUID;

        // Cells are independent: compute per cell, then scatter into the field
        let per_cell = map_cells(&cells, |[i, j, k]| {
            let geom = self.metric.geometry_at(i, j, k);
            let cons = conserved_from_primitive(&primitive.cell(i, j, k), &geom, self.adiabatic_index);
            let mut r = [0.0; FluidVariable::NUM_FLUID];
            for (var, value) in r.iter_mut().enumerate() {
                *value = cons[var] - conserved.get(var, i, j, k);
            }
            r
        });

        for ([i, j, k], r) in cells.iter().zip(per_cell) {
            residual.set_cell(*i, *j, *k, &r[..n]);
        }
    }

    fn name(&self) -> &str {
        "Ideal MHD conservation residual"
    }

    fn description(&self) -> Option<&str> {
        Some("Pointwise U(P) - U_target for density, energy and momenta with an ideal-gas closure")
    }
}

// =================================================================================================
// Tests
// =================================================================================================
