//! Grid fields on a structured domain with a ghost halo
//!
//! Every field the engine touches (primitive guess, conserved state,
//! residual, Jacobian components, corrections) is a [`GridField`]: a dense
//! struct-of-arrays block indexed as `[variable, i, j, k]`.
//!
//! # Index domain
//!
//! A [`GridDomain`] describes a 1D, 2D or 3D structured grid of
//! `n1 × n2 × n3` interior cells surrounded by `halo` ghost cells on each
//! side of every *active* dimension. Inactive dimensions have extent 1 and
//! carry no halo:
//!
//! ```text
//!   dim = 2, n1 = 4, n2 = 2, halo = 1
//!
//!   j=3   g g g g g g
//!   j=2   g o o o o g        o : interior cell
//!   j=1   g o o o o g        g : ghost (halo) cell
//!   j=0   g g g g g g
//!         i=0 ...   i=5
//! ```
//!
//! All indices handed out by this module are **total** indices (halo
//! included), so a field can be indexed directly with them.
//!
//! # Memory Layout
//!
//! `Array4<f64>` with shape `[num_vars, n1_total, n2_total, n3_total]`.
//! Each variable is therefore one contiguous 3D block, which keeps whole-
//! variable operations (perturbation, update, copy) cache friendly.

use ndarray::{Array4, ArrayView3, ArrayViewMut3, Axis};

use crate::error::{SolverError, SolverResult};

// =================================================================================================
// Grid Domain
// =================================================================================================

/// Structured index domain with a ghost halo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDomain {
    /// Number of active dimensions (1, 2 or 3)
    dim: usize,

    /// Interior extents along each axis (1 for inactive axes)
    interior: [usize; 3],

    /// Halo width on each side of an active axis
    halo: usize,
}

impl GridDomain {
    /// Create a domain, validating dimension and extents
    ///
    /// Extents along inactive axes are ignored and forced to 1.
    pub fn new(dim: usize, interior: [usize; 3], halo: usize) -> SolverResult<Self> {
        if !(1..=3).contains(&dim) {
            return Err(SolverError::InvalidConfiguration(format!(
                "grid dimension must be 1, 2 or 3, got {dim}"
            )));
        }

        let mut extents = [1usize; 3];
        for axis in 0..dim {
            if interior[axis] == 0 {
                return Err(SolverError::InvalidConfiguration(format!(
                    "grid extent along axis {axis} must be positive"
                )));
            }
            extents[axis] = interior[axis];
        }

        Ok(Self { dim, interior: extents, halo })
    }

    /// 1D domain of `n1` cells
    pub fn line(n1: usize, halo: usize) -> SolverResult<Self> {
        Self::new(1, [n1, 1, 1], halo)
    }

    /// 2D domain of `n1 × n2` cells
    pub fn plane(n1: usize, n2: usize, halo: usize) -> SolverResult<Self> {
        Self::new(2, [n1, n2, 1], halo)
    }

    /// 3D domain of `n1 × n2 × n3` cells
    pub fn volume(n1: usize, n2: usize, n3: usize, halo: usize) -> SolverResult<Self> {
        Self::new(3, [n1, n2, n3], halo)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn halo(&self) -> usize {
        self.halo
    }

    /// Interior extents `[n1, n2, n3]`
    pub fn interior_extents(&self) -> [usize; 3] {
        self.interior
    }

    /// Halo width along `axis` (0 for inactive axes)
    pub fn halo_along(&self, axis: usize) -> usize {
        if axis < self.dim { self.halo } else { 0 }
    }

    /// Total extents including the halo
    pub fn total_extents(&self) -> [usize; 3] {
        let mut total = self.interior;
        for (axis, extent) in total.iter_mut().enumerate() {
            *extent += 2 * self.halo_along(axis);
        }
        total
    }

    /// Number of interior cells
    pub fn num_interior(&self) -> usize {
        self.interior.iter().product()
    }

    /// Number of cells including the halo
    pub fn num_total(&self) -> usize {
        self.total_extents().iter().product()
    }

    /// Whether the total index `(i, j, k)` lies in the interior
    pub fn is_interior(&self, i: usize, j: usize, k: usize) -> bool {
        [i, j, k].iter().enumerate().all(|(axis, &idx)| {
            let lo = self.halo_along(axis);
            idx >= lo && idx < lo + self.interior[axis]
        })
    }

    /// Total indices of every interior cell
    ///
    /// Ordering is `i` fastest, then `j`, then `k`. Batched per-cell systems
    /// use this ordering for their cell axis.
    pub fn interior_cells(&self) -> Vec<[usize; 3]> {
        let [h1, h2, h3] = [self.halo_along(0), self.halo_along(1), self.halo_along(2)];
        let [n1, n2, n3] = self.interior;

        let mut cells = Vec::with_capacity(self.num_interior());
        for k in h3..h3 + n3 {
            for j in h2..h2 + n2 {
                for i in h1..h1 + n1 {
                    cells.push([i, j, k]);
                }
            }
        }
        cells
    }
}

impl std::fmt::Display for GridDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [n1, n2, n3] = self.interior;
        match self.dim {
            1 => write!(f, "{n1} (halo {})", self.halo),
            2 => write!(f, "{n1} x {n2} (halo {})", self.halo),
            _ => write!(f, "{n1} x {n2} x {n3} (halo {})", self.halo),
        }
    }
}

// =================================================================================================
// Grid Field
// =================================================================================================

/// Dense multi-variable field over a [`GridDomain`]
#[derive(Debug, Clone, PartialEq)]
pub struct GridField {
    domain: GridDomain,
    data: Array4<f64>,
}

impl GridField {
    /// Field of `num_vars` variables, all zero
    pub fn zeros(domain: GridDomain, num_vars: usize) -> Self {
        let [t1, t2, t3] = domain.total_extents();
        Self {
            domain,
            data: Array4::zeros((num_vars, t1, t2, t3)),
        }
    }

    /// Field where every cell holds the same per-variable values
    pub fn uniform(domain: GridDomain, values: &[f64]) -> Self {
        let mut field = Self::zeros(domain, values.len());
        for (var, &value) in values.iter().enumerate() {
            field.var_mut(var).fill(value);
        }
        field
    }

    /// Field built cell by cell from `f(var, i, j, k)` (total indices)
    pub fn from_fn<F>(domain: GridDomain, num_vars: usize, f: F) -> Self
    where
        F: Fn(usize, usize, usize, usize) -> f64,
    {
        let [t1, t2, t3] = domain.total_extents();
        Self {
            domain,
            data: Array4::from_shape_fn((num_vars, t1, t2, t3), |(v, i, j, k)| f(v, i, j, k)),
        }
    }

    pub fn domain(&self) -> &GridDomain {
        &self.domain
    }

    pub fn num_vars(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// `[num_vars, n1_total, n2_total, n3_total]`
    pub fn shape(&self) -> Vec<usize> {
        self.data.shape().to_vec()
    }

    /// Raw storage
    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array4<f64> {
        &mut self.data
    }

    /// View of one variable over the whole domain
    pub fn var(&self, var: usize) -> ArrayView3<'_, f64> {
        self.data.index_axis(Axis(0), var)
    }

    pub fn var_mut(&mut self, var: usize) -> ArrayViewMut3<'_, f64> {
        self.data.index_axis_mut(Axis(0), var)
    }

    #[inline]
    pub fn get(&self, var: usize, i: usize, j: usize, k: usize) -> f64 {
        self.data[[var, i, j, k]]
    }

    #[inline]
    pub fn set(&mut self, var: usize, i: usize, j: usize, k: usize, value: f64) {
        self.data[[var, i, j, k]] = value;
    }

    /// All variables of one cell
    pub fn cell(&self, i: usize, j: usize, k: usize) -> Vec<f64> {
        (0..self.num_vars()).map(|v| self.data[[v, i, j, k]]).collect()
    }

    /// Overwrite the leading `values.len()` variables of one cell
    pub fn set_cell(&mut self, i: usize, j: usize, k: usize, values: &[f64]) {
        for (v, &value) in values.iter().enumerate() {
            self.data[[v, i, j, k]] = value;
        }
    }

    /// Copy variable `src_var` of `src` into variable `dst_var` of `self`
    ///
    /// Both fields must live on the same domain.
    pub fn copy_var_from(&mut self, dst_var: usize, src: &GridField, src_var: usize) {
        debug_assert_eq!(self.domain, src.domain, "copy_var_from across different domains");
        self.var_mut(dst_var).assign(&src.var(src_var));
    }

    /// Ensure `other` lives on the same domain as `self`
    pub fn check_same_domain(&self, other: &GridField, what: &'static str) -> SolverResult<()> {
        if self.domain != other.domain {
            let expected = self.domain.total_extents().to_vec();
            let found = other.domain.total_extents().to_vec();
            return Err(SolverError::ShapeMismatch { what, expected, found });
        }
        Ok(())
    }

    /// Ensure the field carries at least `num_vars` variables
    pub fn check_num_vars(&self, num_vars: usize, what: &'static str) -> SolverResult<()> {
        if self.num_vars() < num_vars {
            return Err(SolverError::ShapeMismatch {
                what,
                expected: vec![num_vars],
                found: vec![self.num_vars()],
            });
        }
        Ok(())
    }

    /// Reject NaN/Inf in the leading `num_vars` variables of interior cells
    pub fn check_finite(&self, num_vars: usize, field: &'static str) -> SolverResult<()> {
        for [i, j, k] in self.domain.interior_cells() {
            for var in 0..num_vars.min(self.num_vars()) {
                if !self.data[[var, i, j, k]].is_finite() {
                    return Err(SolverError::NonFinite { field, var, i, j, k });
                }
            }
        }
        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================
