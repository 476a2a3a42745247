//! Convergence criteria for optimization algorithms.
//!
//! This module defines the criteria used to determine when an optimization
//! algorithm has converged to a solution, shared by Levenberg-Marquardt and the
//! simplex method.

use ndarray::Array1;

/// Why an optimization algorithm stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The algorithm is still running.
    Running,

    /// The algorithm has converged due to a small parameter step.
    ParameterConvergence,

    /// The algorithm has converged due to a small spread of function values.
    FunctionValueConvergence,

    /// The algorithm has converged due to a vanishing gradient or residual.
    GradientConvergence,

    /// The algorithm has terminated due to reaching the maximum number of iterations.
    MaxIterationsReached,

    /// The algorithm has terminated due to a numerical error.
    NumericalError,
}

impl ConvergenceStatus {
    /// Returns true if the optimization has terminated (either converged or failed).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the optimization has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "Optimization is still running",
            ConvergenceStatus::ParameterConvergence => "Converged: small parameter change",
            ConvergenceStatus::FunctionValueConvergence => "Converged: small function value spread",
            ConvergenceStatus::GradientConvergence => "Converged: vanishing gradient",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
            ConvergenceStatus::NumericalError => "Terminated: numerical error",
        }
    }
}

/// Criteria for determining when an optimization algorithm has converged.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    /// Relative tolerance.
    pub tolerance: f64,

    /// Maximum number of iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 1000,
        }
    }
}

impl ConvergenceCriteria {
    /// Creates a new set of convergence criteria.
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Whether a parameter step is negligible: `|δ_j| <= tol * (|p_j| + tol)` for all `j`.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values the step starts from
    /// * `step` - The step taken
    pub fn step_converged(&self, params: &Array1<f64>, step: &Array1<f64>) -> bool {
        let tol = self.tolerance;
        step.iter()
            .zip(params.iter())
            .all(|(d, p)| d.abs() <= tol * (p.abs() + tol))
    }

    /// Whether a spread of function values is negligible relative to the best value.
    ///
    /// # Arguments
    ///
    /// * `best` - The smallest function value
    /// * `worst` - The largest function value
    pub fn spread_converged(&self, best: f64, worst: f64) -> bool {
        let tol = self.tolerance;
        (worst - best).abs() <= tol * (best.abs() + tol)
    }

    /// Whether the iteration budget is used up.
    pub fn exhausted(&self, iterations: usize) -> bool {
        iterations >= self.max_iterations
    }
}
