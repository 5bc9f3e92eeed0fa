//! Primitive → conserved → primitive round trips through the closure

use rmhd_rs::models::{conserved_from_primitive, IdealMhdResidual};
use rmhd_rs::physics::{CellGeometry, FluidVariable, GridDomain, GridField, Minkowski, UniformMetric};
use rmhd_rs::solver::{ClosureConfiguration, IdealClosure};

mod common;
use common::{assert_fields_close, magnetized_state, perturbed_guess};

const GAMMA_AD: f64 = 4.0 / 3.0;

fn closure() -> IdealClosure {
    IdealClosure::new(ClosureConfiguration::default().with_adiabatic_index(GAMMA_AD)).unwrap()
}

#[test]
fn test_flat_unmagnetized_grid() {
    let domain = GridDomain::plane(4, 4, 2).unwrap();
    let model = IdealMhdResidual::new(Minkowski, GAMMA_AD);

    let mut exact = magnetized_state(domain);
    for var in FluidVariable::NUM_FLUID..FluidVariable::DOF {
        exact.var_mut(var).fill(0.0);
    }
    let conserved = model.conserved_field(&exact);

    let mut primitive = perturbed_guess(&exact, FluidVariable::NUM_FLUID, 0.1);
    let report = closure().apply(&mut primitive, &conserved, &Minkowski).unwrap();

    assert_eq!(report.cells, 16);
    assert!(report.is_clean(), "{report:?}");
    assert_fields_close(&primitive, &exact, FluidVariable::NUM_FLUID, 1e-8, "flat B = 0");
}

#[test]
fn test_unit_density_at_rest() {
    // D = 1 in every cell
    let domain = GridDomain::line(8, 0).unwrap();
    let exact_cell = [1.0, 0.25, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    let cons_cell = conserved_from_primitive(&exact_cell, &CellGeometry::minkowski(), GAMMA_AD);
    assert_eq!(cons_cell[FluidVariable::Rho.index()], 1.0);

    let conserved = GridField::uniform(domain, &cons_cell);
    let mut primitive = GridField::uniform(domain, &[1.1, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let report = closure().apply(&mut primitive, &conserved, &Minkowski).unwrap();

    assert!(report.is_clean());
    for [i, j, k] in domain.interior_cells() {
        assert!((primitive.get(FluidVariable::Rho.index(), i, j, k) - 1.0).abs() < 1e-8);
    }
}

#[test]
fn test_magnetized_curved_grid() {
    let domain = GridDomain::plane(3, 3, 1).unwrap();
    let metric = UniformMetric::new(CellGeometry::static_diagonal(0.85, [1.2, 1.0, 1.1]).unwrap());
    let model = IdealMhdResidual::new(metric, GAMMA_AD);

    let exact = magnetized_state(domain);
    let conserved = model.conserved_field(&exact);

    let mut primitive = perturbed_guess(&exact, FluidVariable::NUM_FLUID, 0.05);
    let report = closure().apply(&mut primitive, &conserved, &metric).unwrap();

    assert!(report.is_clean(), "{report:?}");
    assert_fields_close(&primitive, &exact, FluidVariable::NUM_FLUID, 1e-7, "magnetized");

    // Field slots pass through untouched
    for var in FluidVariable::NUM_FLUID..FluidVariable::DOF {
        assert_eq!(primitive.var(var), exact.var(var));
    }
}

#[test]
fn test_halo_cells_are_not_recovered() {
    let domain = GridDomain::line(3, 1).unwrap();
    let model = IdealMhdResidual::new(Minkowski, GAMMA_AD);
    let exact = magnetized_state(domain);
    let conserved = model.conserved_field(&exact);

    let mut primitive = perturbed_guess(&exact, FluidVariable::NUM_FLUID, 0.05);
    primitive.set(FluidVariable::U.index(), 0, 0, 0, 42.0);
    closure().apply(&mut primitive, &conserved, &Minkowski).unwrap();

    assert_eq!(primitive.get(FluidVariable::U.index(), 0, 0, 0), 42.0);
}
