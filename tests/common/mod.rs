//! Common utilities for integration tests

#![allow(dead_code)]

pub mod mock_models;
pub mod test_helpers;

// Re-export commonly used items
pub use mock_models::{CoupledQuadratic, KinkResidual, LinearResidual, LogResidual};
pub use test_helpers::{
    assert_fields_close,
    diagonally_dominant_batch,
    magnetized_state,
    max_abs_difference,
    perturbed_guess,
};
