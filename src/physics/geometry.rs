//! Per-cell spacetime geometry
//!
//! The metric and connection construction are external to the engine; the
//! closure solver only needs a read-only lookup of the local geometry at a
//! cell centre. [`Metric`] is that lookup, [`CellGeometry`] its answer.
//!
//! # Conventions
//!
//! - Signature `(-, +, +, +)`, index 0 is time.
//! - `lapse` is `α = 1/√(-g^{tt})`.
//! - `g` is `√(-det g_{μν})`, the volume factor multiplying conserved
//!   densities.

use nalgebra::Matrix4;

use crate::error::{SolverError, SolverResult};

/// Number of spacetime dimensions
pub const NDIM: usize = 4;

/// Local geometry at one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    /// Lapse α
    pub lapse: f64,

    /// √(-det g_{μν})
    pub g: f64,

    /// Covariant metric g_{μν}
    pub gcov: [[f64; NDIM]; NDIM],

    /// Contravariant metric g^{μν}
    pub gcon: [[f64; NDIM]; NDIM],
}

impl CellGeometry {
    /// Flat spacetime in Cartesian coordinates
    pub fn minkowski() -> Self {
        let mut gcov = [[0.0; NDIM]; NDIM];
        gcov[0][0] = -1.0;
        gcov[1][1] = 1.0;
        gcov[2][2] = 1.0;
        gcov[3][3] = 1.0;

        Self { lapse: 1.0, g: 1.0, gcov, gcon: gcov }
    }

    /// Build the full geometry from a covariant metric
    ///
    /// Fails when the metric is singular or not Lorentzian with a time-like
    /// first axis.
    pub fn from_covariant(gcov: [[f64; NDIM]; NDIM]) -> SolverResult<Self> {
        let m = Matrix4::from_fn(|r, c| gcov[r][c]);
        let det = m.determinant();
        if !(det < 0.0) {
            return Err(SolverError::InvalidConfiguration(format!(
                "metric determinant must be negative, got {det:e}"
            )));
        }

        let inv = m.try_inverse().ok_or_else(|| {
            SolverError::InvalidConfiguration("metric is not invertible".to_string())
        })?;

        let mut gcon = [[0.0; NDIM]; NDIM];
        for (r, row) in gcon.iter_mut().enumerate() {
            for (c, entry) in row.iter_mut().enumerate() {
                *entry = inv[(r, c)];
            }
        }

        if !(gcon[0][0] < 0.0) {
            return Err(SolverError::InvalidConfiguration(
                "g^tt must be negative for a space-like slicing".to_string(),
            ));
        }

        Ok(Self {
            lapse: 1.0 / (-gcon[0][0]).sqrt(),
            g: (-det).sqrt(),
            gcov,
            gcon,
        })
    }

    /// Static metric `diag(-α², γ_11, γ_22, γ_33)`
    pub fn static_diagonal(lapse: f64, spatial: [f64; 3]) -> SolverResult<Self> {
        let mut gcov = [[0.0; NDIM]; NDIM];
        gcov[0][0] = -lapse * lapse;
        for (axis, &value) in spatial.iter().enumerate() {
            gcov[axis + 1][axis + 1] = value;
        }
        Self::from_covariant(gcov)
    }

    /// Lower an index: `v_μ = g_{μν} v^ν`
    #[inline]
    pub fn lower(&self, vcon: &[f64; NDIM]) -> [f64; NDIM] {
        contract(&self.gcov, vcon)
    }

    /// Raise an index: `v^μ = g^{μν} v_ν`
    #[inline]
    pub fn raise(&self, vcov: &[f64; NDIM]) -> [f64; NDIM] {
        contract(&self.gcon, vcov)
    }
}

/// `a_μ b^μ`
#[inline]
pub fn dot(a: &[f64; NDIM], b: &[f64; NDIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn contract(metric: &[[f64; NDIM]; NDIM], v: &[f64; NDIM]) -> [f64; NDIM] {
    let mut out = [0.0; NDIM];
    for (mu, row) in metric.iter().enumerate() {
        out[mu] = dot(row, v);
    }
    out
}

// =================================================================================================
// Metric lookup
// =================================================================================================

/// Read-only geometry lookup at cell centres (total grid indices)
pub trait Metric: Send + Sync {
    fn geometry_at(&self, i: usize, j: usize, k: usize) -> CellGeometry;
}

/// Flat spacetime everywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct Minkowski;

impl Metric for Minkowski {
    fn geometry_at(&self, _i: usize, _j: usize, _k: usize) -> CellGeometry {
        CellGeometry::minkowski()
    }
}

/// The same geometry in every cell
#[derive(Debug, Clone, Copy)]
pub struct UniformMetric {
    geometry: CellGeometry,
}

impl UniformMetric {
    pub fn new(geometry: CellGeometry) -> Self {
        Self { geometry }
    }
}

impl Metric for UniformMetric {
    fn geometry_at(&self, _i: usize, _j: usize, _k: usize) -> CellGeometry {
        self.geometry
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minkowski_matches_from_covariant() {
        let flat = CellGeometry::minkowski();
        let built = CellGeometry::from_covariant(flat.gcov).unwrap();

        assert_relative_eq!(built.lapse, 1.0, epsilon = 1e-14);
        assert_relative_eq!(built.g, 1.0, epsilon = 1e-14);
        for mu in 0..NDIM {
            for nu in 0..NDIM {
                assert_relative_eq!(built.gcon[mu][nu], flat.gcon[mu][nu], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn test_static_diagonal_lapse_and_volume() {
        let geom = CellGeometry::static_diagonal(0.8, [1.5, 2.0, 0.5]).unwrap();

        assert_relative_eq!(geom.lapse, 0.8, epsilon = 1e-12);
        assert_relative_eq!(geom.g, 0.8 * (1.5f64 * 2.0 * 0.5).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(geom.gcon[1][1], 1.0 / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_raise_lower_roundtrip() {
        let mut gcov = CellGeometry::minkowski().gcov;
        // Boosted-frame shift term
        gcov[0][1] = 0.2;
        gcov[1][0] = 0.2;
        let geom = CellGeometry::from_covariant(gcov).unwrap();

        let v = [1.2, -0.3, 0.4, 0.1];
        let back = geom.raise(&geom.lower(&v));
        for mu in 0..NDIM {
            assert_relative_eq!(back[mu], v[mu], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_riemannian_metric() {
        let mut gcov = CellGeometry::minkowski().gcov;
        gcov[0][0] = 1.0;
        assert!(CellGeometry::from_covariant(gcov).is_err());
    }

    #[test]
    fn test_uniform_metric_lookup() {
        let geom = CellGeometry::static_diagonal(0.5, [1.0, 1.0, 1.0]).unwrap();
        let metric = UniformMetric::new(geom);
        assert_eq!(metric.geometry_at(3, 1, 0), geom);
        assert_eq!(Minkowski.geometry_at(0, 0, 0), CellGeometry::minkowski());
    }
}
