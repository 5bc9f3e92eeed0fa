//! Helper functions for integration tests

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rmhd_rs::physics::{FluidVariable, GridDomain, GridField};
use rmhd_rs::solver::SystemBatch;

/// Largest `|a - b|` over the first `num_vars` slots of the interior cells
pub fn max_abs_difference(a: &GridField, b: &GridField, num_vars: usize) -> f64 {
    let mut max = 0.0_f64;
    for [i, j, k] in a.domain().interior_cells() {
        for var in 0..num_vars {
            max = max.max((a.get(var, i, j, k) - b.get(var, i, j, k)).abs());
        }
    }
    max
}

/// Assert that two fields agree on the interior, slot by slot
pub fn assert_fields_close(a: &GridField, b: &GridField, num_vars: usize, tolerance: f64, message: &str) {
    for [i, j, k] in a.domain().interior_cells() {
        for var in 0..num_vars {
            let (va, vb) = (a.get(var, i, j, k), b.get(var, i, j, k));
            let scale = va.abs().max(vb.abs()).max(1.0);
            assert!(
                (va - vb).abs() <= tolerance * scale,
                "{}: slot {} of cell ({}, {}, {}) is {} vs {} (tolerance {})",
                message, var, i, j, k, va, vb, tolerance
            );
        }
    }
}

/// A smooth magnetized primitive state, different in every cell
pub fn magnetized_state(domain: GridDomain) -> GridField {
    GridField::from_fn(domain, FluidVariable::DOF, |var, i, j, k| {
        let s = 0.1 * (i + 2 * j + 3 * k) as f64;
        match FluidVariable::ALL[var] {
            FluidVariable::Rho => 1.0 + 0.5 * s.sin().abs(),
            FluidVariable::U => 0.3 + 0.1 * s.cos().abs(),
            FluidVariable::U1 => 0.2 * s.cos(),
            FluidVariable::U2 => -0.1 + 0.05 * s.sin(),
            FluidVariable::U3 => 0.05,
            FluidVariable::B1 => 0.3,
            FluidVariable::B2 => 0.1 * s.sin(),
            FluidVariable::B3 => -0.2,
        }
    })
}

/// Copy of `exact` with the first `num_vars` interior slots scaled by `1 ± fraction`
///
/// The sign alternates with the slot, halo cells are left exact.
pub fn perturbed_guess(exact: &GridField, num_vars: usize, fraction: f64) -> GridField {
    let mut guess = exact.clone();
    for [i, j, k] in exact.domain().interior_cells() {
        for var in 0..num_vars {
            let sign = if (var + i) % 2 == 0 { 1.0 } else { -1.0 };
            let value = exact.get(var, i, j, k);
            guess.set(var, i, j, k, value * (1.0 + sign * fraction) + 1e-3 * sign * fraction);
        }
    }
    guess
}

/// Random strictly diagonally dominant systems, reproducible from `seed`
pub fn diagonally_dominant_batch(num_cells: usize, n: usize, seed: u64) -> SystemBatch {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut matrices = Array3::<f64>::zeros((num_cells, n, n));
    let mut rhs = Array2::<f64>::zeros((num_cells, n));
    for c in 0..num_cells {
        for r in 0..n {
            let mut off_diagonal = 0.0;
            for col in 0..n {
                if col != r {
                    let value = rng.gen_range(-1.0..1.0);
                    matrices[[c, r, col]] = value;
                    off_diagonal += f64::abs(value);
                }
            }
            let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            matrices[[c, r, r]] = sign * (off_diagonal + rng.gen_range(0.5..2.0));
            rhs[[c, r]] = rng.gen_range(-10.0..10.0);
        }
    }

    SystemBatch::new(matrices, rhs).expect("consistent batch shapes")
}
