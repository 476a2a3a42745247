//! Utility functions and helpers for the curvefit-rs library.

pub mod finite_difference;
pub mod linalg;
pub mod matrix_convert;

pub use finite_difference::jacobian;
pub use linalg::{invert_symmetric, least_squares, solve_spd};
