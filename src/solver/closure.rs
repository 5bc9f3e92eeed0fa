//! Ideal-fluid primitive recovery (one-dimensional inversion)
//!
//! # Mathematical Background
//!
//! Given conserved variables and the local geometry, all primitive variables
//! follow from a single scalar unknown, `W = w γ²` (enthalpy density times
//! Lorentz factor squared). The solve works with the excess over the rest
//! mass, `Wp = W − D`, which avoids cancellation in the non-relativistic
//! limit.
//!
//! Projections against the normal observer `n_μ = (−α, 0, 0, 0)`:
//!
//! ```text
//!   D      = α U_rho / g                    (= ρ₀ γ)
//!   Q_μ    = α U_μ / g
//!   B^μ    = (0, α B^i)
//!   Q̃^μ    = Q^μ + n^μ (Q·n)               Q̃² = Q² + (Q·n)²
//!   Ep     = −Q·n − D
//! ```
//!
//! Energy balance, as a function of `Wp` alone:
//!
//! ```text
//!   err(Wp) = −Ep + Wp − p + ½ B² + ½ (B² Q̃² − (Q·B)²) / (B² + W)²
//! ```
//!
//! with `γ(Wp)` from the momentum balance, `ρ₀ = D/γ`, `w = W/γ²` and the
//! ideal-gas law `p = (w − ρ₀)(Γ − 1)/Γ`.
//!
//! # Iteration
//!
//! 1. Initial `Wp = (ρ₀ + u + p) γ̃² − ρ₀ γ̃` from the current primitive guess.
//!    A cold guess (`Wp <= 0`, e.g. `u = 0` at rest) starts from
//!    `Ep − ½ B²` instead, floored at a tiny positive value: bounded
//!    updates cannot leave `Wp = 0`
//! 2. One damped Newton step with centred derivative estimates and the
//!    curvature correction clamped to `±0.3`
//! 3. Up to `secant_passes` secant steps, stopping early once `err` is below
//!    tolerance
//!
//! Every update is bounded to `[−Wp/2, 2 Wp]`.
//!
//! # Finalisation
//!
//! All cells are solved from read-only inputs first; the primitive field is
//! written in one pass afterwards. Cells whose result is unphysical
//! (non-positive density, negative pressure, non-finite values) keep their
//! previous primitives and are listed in the [`ClosureReport`].

use log::{debug, warn};

use crate::error::SolverResult;
use crate::physics::geometry::{dot, CellGeometry, Metric, NDIM};
use crate::physics::{FluidVariable, GridField};
use crate::solver::map_cells;
use crate::solver::traits::ClosureConfiguration;

/// Largest curvature correction admitted in the Newton step
const CURVATURE_CLAMP: f64 = 0.3;

/// Smallest starting `Wp`, relative to `max(1, D)`
const WP_FLOOR: f64 = 1e-10;

/// Ideal-gas pressure from rest-mass density and enthalpy density
#[inline]
pub fn pressure_rho0_w(rho0: f64, w: f64, adiabatic_index: f64) -> f64 {
    (w - rho0) * (adiabatic_index - 1.0) / adiabatic_index
}

// =================================================================================================
// Per-cell invariants
// =================================================================================================

/// Scalars of one cell that the energy balance depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosureInvariants {
    pub d: f64,
    pub ep: f64,
    pub b_sqr: f64,
    pub q_dot_b: f64,
    pub q_tilde_sqr: f64,
}

impl ClosureInvariants {
    /// Lorentz factor implied by `Wp` through the momentum balance
    pub fn gamma(&self, wp: f64) -> f64 {
        let w_big = wp + self.d;
        let wb = w_big + self.b_sqr;
        let qb_sqr = self.q_dot_b * self.q_dot_b;
        let w_sqr = w_big * w_big;

        let u_tilde_sqr = -((w_big + wb) * qb_sqr + w_sqr * self.q_tilde_sqr)
            / (qb_sqr * (w_big + wb) + w_sqr * (self.q_tilde_sqr - wb * wb));

        (1.0 + u_tilde_sqr.abs()).sqrt()
    }

    /// Energy-balance residual at `Wp`
    pub fn err(&self, wp: f64, adiabatic_index: f64) -> f64 {
        let w_big = wp + self.d;
        let gamma = self.gamma(wp);
        let w = w_big / (gamma * gamma);
        let rho0 = self.d / gamma;
        let p = pressure_rho0_w(rho0, w, adiabatic_index);
        let bw = self.b_sqr + w_big;

        -self.ep + wp - p
            + 0.5 * self.b_sqr
            + 0.5 * (self.b_sqr * self.q_tilde_sqr - self.q_dot_b * self.q_dot_b) / (bw * bw)
    }
}

/// Projected conserved state of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellProjection {
    invariants: ClosureInvariants,
    q_tilde_con: [f64; NDIM],
    b_con: [f64; NDIM],
}

impl CellProjection {
    fn new(prim: &[f64], cons: &[f64], geom: &CellGeometry) -> Self {
        use FluidVariable::*;

        let alpha = geom.lapse;
        let d = cons[Rho.index()] * alpha / geom.g;

        let b_con = [
            0.0,
            prim[B1.index()] * alpha,
            prim[B2.index()] * alpha,
            prim[B3.index()] * alpha,
        ];
        let b_sqr = dot(&geom.lower(&b_con), &b_con);

        let mut q_cov = [0.0; NDIM];
        for (mu, q) in q_cov.iter_mut().enumerate() {
            *q = cons[U.index() + mu] * alpha / geom.g;
        }
        let q_con = geom.raise(&q_cov);

        let n_con = geom.raise(&[-alpha, 0.0, 0.0, 0.0]);
        let q_dot_n = dot(&q_cov, &n_con);
        let q_dot_b = dot(&q_cov, &b_con);
        let q_sqr = dot(&q_cov, &q_con);

        let mut q_tilde_con = [0.0; NDIM];
        for mu in 0..NDIM {
            q_tilde_con[mu] = q_con[mu] + n_con[mu] * q_dot_n;
        }

        Self {
            invariants: ClosureInvariants {
                d,
                ep: -q_dot_n - d,
                b_sqr,
                q_dot_b,
                q_tilde_sqr: q_sqr + q_dot_n * q_dot_n,
            },
            q_tilde_con,
            b_con,
        }
    }
}

// =================================================================================================
// Results
// =================================================================================================

/// Outcome of the inversion in one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRecovery {
    /// `[ρ₀, u, ũ¹, ũ², ũ³]`
    pub primitive: [f64; FluidVariable::NUM_FLUID],

    /// `|err|` at the final `Wp`
    pub residual: f64,

    pub converged: bool,

    /// Positive density, non-negative pressure, finite values
    pub physical: bool,
}

/// Diagnostics of one field-wide closure pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClosureReport {
    pub cells: usize,

    /// Largest final `|err|` over physical cells
    pub max_residual: f64,

    /// Physical cells whose residual is still above tolerance
    pub unconverged_cells: usize,

    /// Cells left untouched because the recovered state was unphysical
    pub unphysical_cells: Vec<[usize; 3]>,
}

impl ClosureReport {
    pub fn is_clean(&self) -> bool {
        self.unconverged_cells == 0 && self.unphysical_cells.is_empty()
    }
}

// =================================================================================================
// Closure solver
// =================================================================================================

/// Per-cell ideal-MHD primitive recovery
#[derive(Debug, Clone)]
pub struct IdealClosure {
    config: ClosureConfiguration,
}

impl IdealClosure {
    pub fn new(config: ClosureConfiguration) -> SolverResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClosureConfiguration {
        &self.config
    }

    #[inline]
    fn bounded(dw: f64, wp: f64) -> f64 {
        dw.min(2.0 * wp).max(-0.5 * wp)
    }

    fn converged(&self, err: f64, inv: &ClosureInvariants) -> bool {
        err.abs() <= self.config.tolerance * inv.ep.abs().max(1.0)
    }

    /// Recover the fluid primitives of one cell
    ///
    /// `prim` supplies the magnetic field and the initial guess, `cons` the
    /// conserved state; both use the [`FluidVariable`] slot layout.
    pub fn recover_cell(&self, prim: &[f64], cons: &[f64], geom: &CellGeometry) -> CellRecovery {
        use FluidVariable::*;

        let gamma_ad = self.config.adiabatic_index;
        let projection = CellProjection::new(prim, cons, geom);
        let inv = projection.invariants;

        // Initial guess from the current primitives
        let u_tilde_con = [0.0, prim[U1.index()], prim[U2.index()], prim[U3.index()]];
        let u_tilde_sqr = dot(&geom.lower(&u_tilde_con), &u_tilde_con);
        let gamma_tilde = (1.0 + u_tilde_sqr.abs()).sqrt();
        let (rho, u) = (prim[Rho.index()], prim[U.index()]);
        let pressure = (gamma_ad - 1.0) * u;
        let mut wp = (rho + u + pressure) * gamma_tilde * gamma_tilde - rho * gamma_tilde;
        if !(wp > 0.0) {
            // Cold guess: start from the fluid energy instead
            wp = (inv.ep - 0.5 * inv.b_sqr).max(WP_FLOOR * inv.d.abs().max(1.0));
        }

        // Damped Newton step
        let h = if wp != 0.0 { self.config.derivative_step * wp } else { self.config.derivative_step };
        let (wp_minus, wp_plus) = (wp - h, wp + h);
        let err_plus = inv.err(wp_plus, gamma_ad);
        let mut err = inv.err(wp, gamma_ad);
        let err_minus = inv.err(wp_minus, gamma_ad);

        let d_err = (err_plus - err_minus) / (wp_plus - wp_minus);
        let d2_err = (err_plus - 2.0 * err + err_minus) / (h * h);

        let mut wp_prev = wp;
        let mut err_prev = err;

        if !self.converged(err, &inv) {
            let dw = if d_err != 0.0 && d_err.is_finite() {
                let f = 0.5 * err * d2_err / (d_err * d_err);
                -err / d_err / (1.0 - f.min(CURVATURE_CLAMP).max(-CURVATURE_CLAMP))
            } else {
                0.0
            };
            if dw.is_finite() {
                wp += Self::bounded(dw, wp);
                err = inv.err(wp, gamma_ad);
            }

            // Secant refinement with early exit
            for _ in 0..self.config.secant_passes {
                if self.converged(err, &inv) || err == err_prev {
                    break;
                }
                let dw = (wp_prev - wp) * err / (err - err_prev);
                if !dw.is_finite() {
                    break;
                }

                wp_prev = wp;
                err_prev = err;
                wp += Self::bounded(dw, wp);
                err = inv.err(wp, gamma_ad);
            }
        }

        // Back out the primitives
        let gamma = inv.gamma(wp);
        let rho0 = inv.d / gamma;
        let w_big = wp + inv.d;
        let w = w_big / (gamma * gamma);
        let p = pressure_rho0_w(rho0, w, gamma_ad);

        let mut primitive = [0.0; FluidVariable::NUM_FLUID];
        primitive[Rho.index()] = rho0;
        primitive[U.index()] = w - (rho0 + p);
        let scale = gamma / (w_big + inv.b_sqr);
        for i in 1..NDIM {
            primitive[U1.index() + i - 1] =
                scale * (projection.q_tilde_con[i] + inv.q_dot_b * projection.b_con[i] / w_big);
        }

        let physical = rho0 > 0.0 && p >= 0.0 && primitive.iter().all(|v| v.is_finite());

        CellRecovery {
            primitive,
            residual: err.abs(),
            converged: self.converged(err, &inv),
            physical,
        }
    }

    /// Recover primitives on every interior cell of `primitive`
    ///
    /// Magnetic-field slots of `primitive` are read, never written.
    pub fn apply(&self, primitive: &mut GridField, conserved: &GridField, metric: &dyn Metric) -> SolverResult<ClosureReport> {
        primitive.check_same_domain(conserved, "conserved")?;
        primitive.check_num_vars(FluidVariable::DOF, "primitive")?;
        conserved.check_num_vars(FluidVariable::NUM_FLUID, "conserved")?;

        let cells = primitive.domain().interior_cells();

        // Solve phase: read-only
        let recovered = {
            let prim: &GridField = primitive;
            map_cells(&cells, |[i, j, k]| {
                self.recover_cell(&prim.cell(i, j, k), &conserved.cell(i, j, k), &metric.geometry_at(i, j, k))
            })
        };

        // Finalisation phase: the only writes to the primitive field
        let mut report = ClosureReport { cells: cells.len(), ..ClosureReport::default() };
        for (&[i, j, k], cell) in cells.iter().zip(recovered.iter()) {
            if !cell.physical {
                report.unphysical_cells.push([i, j, k]);
                continue;
            }
            primitive.set_cell(i, j, k, &cell.primitive);
            report.max_residual = report.max_residual.max(cell.residual);
            if !cell.converged {
                report.unconverged_cells += 1;
            }
        }

        if !report.unphysical_cells.is_empty() {
            warn!(
                "Closure: {} of {} cells unphysical, previous primitives kept",
                report.unphysical_cells.len(),
                report.cells
            );
        }
        if report.unconverged_cells > 0 {
            warn!(
                "Closure: {} cells above tolerance after {} secant passes (max |err| = {:e})",
                report.unconverged_cells, self.config.secant_passes, report.max_residual
            );
        }
        debug!("Closure: {} cells, max |err| = {:e}", report.cells, report.max_residual);

        Ok(report)
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ideal_mhd::conserved_from_primitive;
    use crate::physics::{GridDomain, Minkowski};
    use approx::assert_relative_eq;

    const GAMMA_AD: f64 = 4.0 / 3.0;

    fn closure() -> IdealClosure {
        IdealClosure::new(ClosureConfiguration::default()).unwrap()
    }

    #[test]
    fn test_pressure_law() {
        // w - rho0 = u + p with p = (Γ-1) u
        let (rho0, u) = (1.0, 0.6);
        let p = (GAMMA_AD - 1.0) * u;
        assert_relative_eq!(pressure_rho0_w(rho0, rho0 + u + p, GAMMA_AD), p, epsilon = 1e-15);
    }

    #[test]
    fn test_err_vanishes_at_exact_state() {
        let geom = CellGeometry::minkowski();
        let prim = [1.0, 0.5, 0.3, -0.1, 0.2, 0.0, 0.0, 0.0];
        let cons = conserved_from_primitive(&prim, &geom, GAMMA_AD);
        let inv = CellProjection::new(&prim, &cons, &geom).invariants;

        let gamma = (1.0f64 + 0.09 + 0.01 + 0.04).sqrt();
        let enthalpy = 1.0 + 0.5 + (GAMMA_AD - 1.0) * 0.5;
        let wp = enthalpy * gamma * gamma - gamma;

        assert_relative_eq!(inv.gamma(wp), gamma, epsilon = 1e-12);
        assert!(inv.err(wp, GAMMA_AD).abs() < 1e-12);
    }

    #[test]
    fn test_flat_rest_state_recovers_density_exactly() {
        // D = 1, no momentum, no field
        let geom = CellGeometry::minkowski();
        let exact = [1.0, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let cons = conserved_from_primitive(&exact, &geom, GAMMA_AD);
        assert_relative_eq!(cons[0], 1.0);

        let guess = [0.7, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let cell = closure().recover_cell(&guess, &cons, &geom);

        assert!(cell.physical);
        assert!((cell.primitive[0] - 1.0).abs() < 1e-8);
        assert!((cell.primitive[1] - 0.2).abs() < 1e-8);
    }

    #[test]
    fn test_cold_guess_at_rest_still_moves() {
        let geom = CellGeometry::minkowski();
        let exact = [1.0, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let cons = conserved_from_primitive(&exact, &geom, GAMMA_AD);

        // u = 0 and no velocity: Wp of the guess is exactly zero
        let guess = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let cell = closure().recover_cell(&guess, &cons, &geom);

        assert!(cell.converged);
        assert!(cell.physical);
        assert!((cell.primitive[0] - 1.0).abs() < 1e-8);
        assert!((cell.primitive[1] - 0.2).abs() < 1e-8);
    }

    #[test]
    fn test_magnetized_moving_cell() {
        let geom = CellGeometry::static_diagonal(0.9, [1.2, 1.0, 0.8]).unwrap();
        let exact = [1.3, 0.4, 0.2, -0.1, 0.05, 0.3, -0.2, 0.1];
        let cons = conserved_from_primitive(&exact, &geom, GAMMA_AD);

        let mut guess = exact;
        guess[0] *= 1.05;
        guess[1] *= 0.95;
        guess[2] *= 1.1;

        let cell = closure().recover_cell(&guess, &cons, &geom);
        assert!(cell.converged);
        for var in 0..FluidVariable::NUM_FLUID {
            assert_relative_eq!(cell.primitive[var], exact[var], epsilon = 1e-8, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_unphysical_cell_is_flagged_and_kept() {
        let domain = GridDomain::line(2, 0).unwrap();
        let exact = [1.0, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let cons_cell = conserved_from_primitive(&exact, &CellGeometry::minkowski(), GAMMA_AD);

        let mut conserved = GridField::uniform(domain, &cons_cell);
        // Negative mass in cell 1
        conserved.set(FluidVariable::Rho.index(), 1, 0, 0, -1.0);

        let mut primitive = GridField::uniform(domain, &[0.9, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let report = closure().apply(&mut primitive, &conserved, &Minkowski).unwrap();

        assert_eq!(report.cells, 2);
        assert_eq!(report.unphysical_cells, vec![[1, 0, 0]]);
        assert!((primitive.get(0, 0, 0, 0) - 1.0).abs() < 1e-8);
        assert_eq!(primitive.get(0, 1, 0, 0), 0.9);
    }

    #[test]
    fn test_apply_rejects_short_primitive_field() {
        let domain = GridDomain::line(2, 1).unwrap();
        let mut primitive = GridField::zeros(domain, FluidVariable::NUM_FLUID);
        let conserved = GridField::zeros(domain, FluidVariable::DOF);
        assert!(closure().apply(&mut primitive, &conserved, &Minkowski).is_err());
    }
}
