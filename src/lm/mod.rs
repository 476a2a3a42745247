//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the scaled and unscaled Levenberg-Marquardt minimizers
//! and the convergence criteria shared with the simplex method.

pub mod algorithm;
pub mod config;
pub mod convergence;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::{DampingScaling, LmConfig};
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
