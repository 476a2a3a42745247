//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the damping schedule, convergence thresholds and the
//! choice between the scaled and unscaled variants.

/// How the damping term is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DampingScaling {
    /// Damp with `λ I`: every parameter gets the same damping.
    Unscaled,

    /// Damp with `λ D²`, `D²` the running maximum of `diag(J^T J)`, so the step
    /// is invariant to the units of each parameter.
    #[default]
    Scaled,
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 1000
    pub max_iterations: usize,

    /// Relative tolerance on the parameter step. Default: 1e-4
    ///
    /// The fit has converged once `|δ_j| <= tol * (|p_j| + tol)` for every parameter.
    pub tolerance: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Damping shape. Default: Scaled
    pub scaling: DampingScaling,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-4,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e10,
            scaling: DampingScaling::default(),
        }
    }
}
