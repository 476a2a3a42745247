//! Algorithm selection and the optimizer state machine.
//!
//! An [`Optimizer`] is built for exactly one fit. It starts `Initialized`, is
//! `Iterating` while the chosen algorithm runs and ends in one of the terminal
//! states `Converged`, `MaxIterationsReached` or `Failed`.

use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InputError, Result};
use crate::lm::{ConvergenceStatus, DampingScaling, LevenbergMarquardt, LmConfig};
use crate::problem::Problem;
use crate::simplex::NelderMead;

/// Minimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Nelder-Mead simplex, gradient-free.
    Simplex,

    /// Levenberg-Marquardt with damping scaled by the Jacobian column norms.
    #[default]
    ScaledLM,

    /// Levenberg-Marquardt with uniform damping.
    UnscaledLM,
}

impl Algorithm {
    /// Whether the algorithm needs model derivatives.
    pub fn requires_jacobian(&self) -> bool {
        !matches!(self, Algorithm::Simplex)
    }

    /// Human-readable name used in fit reports.
    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::Simplex => "Nelder-Mead Simplex",
            Algorithm::ScaledLM => "Scaled Levenberg-Marquardt",
            Algorithm::UnscaledLM => "Unscaled Levenberg-Marquardt",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of an optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    Initialized,
    Iterating,
    Converged,
    MaxIterationsReached,
    Failed,
}

impl OptimizerState {
    /// Whether the optimizer has stopped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OptimizerState::Converged | OptimizerState::MaxIterationsReached | OptimizerState::Failed
        )
    }
}

impl From<ConvergenceStatus> for OptimizerState {
    fn from(status: ConvergenceStatus) -> Self {
        match status {
            ConvergenceStatus::Running => OptimizerState::Iterating,
            ConvergenceStatus::ParameterConvergence
            | ConvergenceStatus::FunctionValueConvergence
            | ConvergenceStatus::GradientConvergence => OptimizerState::Converged,
            ConvergenceStatus::MaxIterationsReached => OptimizerState::MaxIterationsReached,
            ConvergenceStatus::NumericalError => OptimizerState::Failed,
        }
    }
}

/// Where an optimizer run ended.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// Varying parameters at the end of the run
    pub params: Array1<f64>,

    /// Sum of squared weighted residuals at `params`
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Terminal state
    pub state: OptimizerState,

    /// A message describing the result
    pub message: String,
}

/// A single-use minimizer for one fit.
#[derive(Debug, Clone)]
pub struct Optimizer {
    algorithm: Algorithm,
    tolerance: f64,
    max_iterations: usize,
    state: OptimizerState,
}

impl Optimizer {
    /// Create an optimizer in the `Initialized` state.
    pub fn new(algorithm: Algorithm, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            algorithm,
            tolerance,
            max_iterations,
            state: OptimizerState::Initialized,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Run the algorithm to a terminal state.
    ///
    /// # Arguments
    ///
    /// * `problem` - The weighted residual problem
    /// * `initial` - Starting values of the varying parameters
    /// * `on_iteration` - Called with `(iteration, cost)` as the run progresses
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidState` if the optimizer has already run
    /// * `FitError::DimensionMismatch` if `initial` does not match the problem
    pub fn run<P: Problem + ?Sized>(
        &mut self,
        problem: &P,
        initial: Array1<f64>,
        on_iteration: &mut dyn FnMut(usize, f64),
    ) -> Result<OptimizationOutcome> {
        if self.state != OptimizerState::Initialized {
            return Err(InputError::InvalidState(format!(
                "optimizer already ran and is {:?}",
                self.state
            ))
            .into());
        }
        self.state = OptimizerState::Iterating;

        let result = match self.algorithm {
            Algorithm::Simplex => NelderMead::new()
                .with_tolerance(self.tolerance)
                .with_max_iterations(self.max_iterations)
                .minimize_with_callback(problem, initial, on_iteration)
                .map(|r| (r.params, r.cost, r.iterations, r.func_evals, r.status, r.message)),
            Algorithm::ScaledLM | Algorithm::UnscaledLM => {
                let scaling = if self.algorithm == Algorithm::ScaledLM {
                    DampingScaling::Scaled
                } else {
                    DampingScaling::Unscaled
                };
                let config = LmConfig {
                    max_iterations: self.max_iterations,
                    tolerance: self.tolerance,
                    scaling,
                    ..LmConfig::default()
                };
                LevenbergMarquardt::with_config(config)
                    .minimize_with_callback(problem, initial, on_iteration)
                    .map(|r| (r.params, r.cost, r.iterations, r.func_evals, r.status, r.message))
            }
        };

        let (params, cost, iterations, func_evals, status, message) = match result {
            Ok(parts) => parts,
            Err(err) => {
                self.state = OptimizerState::Failed;
                return Err(err);
            }
        };

        self.state = OptimizerState::from(status);
        debug!(
            "{} finished in state {:?} after {} iterations",
            self.algorithm, self.state, iterations
        );

        Ok(OptimizationOutcome {
            params,
            cost,
            iterations,
            func_evals,
            state: self.state,
            message,
        })
    }
}
