//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Damped Gauss-Newton iterations on `min |r(p)|²`. Each iteration solves
//!
//! ```text
//! (J^T J + λ D²) δ = -J^T r
//! ```
//!
//! where `D² = I` for the unscaled variant and the running maximum of
//! `diag(J^T J)` for the scaled one. A step that lowers the cost is accepted and
//! λ shrinks; a step that does not is rejected and λ grows.

use log::{debug, trace, warn};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::utils::linalg::solve_spd;

use super::config::{DampingScaling, LmConfig};
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};

/// Floor for the scaling diagonal, keeps `D²` positive for columns that vanish.
const MIN_SCALE: f64 = f64::EPSILON;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Why the optimization stopped
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,
}

impl LmResult {
    /// Whether the optimization converged.
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success())?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the relative tolerance on the parameter step.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the maximum value for lambda.
    pub fn with_max_lambda(mut self, max_lambda: f64) -> Self {
        self.config.max_lambda = max_lambda;
        self
    }

    /// Choose between the scaled and unscaled damping term.
    pub fn with_scaling(mut self, scaling: DampingScaling) -> Self {
        self.config.scaling = scaling;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * `Result<LmResult>` - The result of the optimization. Numerical trouble is
    ///   reported through [`LmResult::status`], not as an error.
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        self.minimize_with_callback(problem, initial_params, &mut |_, _| {})
    }

    /// Like [`LevenbergMarquardt::minimize`], calling `on_iteration(iteration, cost)`
    /// after every accepted step.
    ///
    /// # Errors
    ///
    /// * `FitError::DimensionMismatch` if `initial_params` does not match the problem
    pub fn minimize_with_callback<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        on_iteration: &mut dyn FnMut(usize, f64),
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let criteria = ConvergenceCriteria::new(self.config.tolerance, self.config.max_iterations);

        let mut params = initial_params;
        problem.project(&mut params);
        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        let mut cost = sum_of_squares(&residuals);

        let finish = |params: Array1<f64>,
                      residuals: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      status: ConvergenceStatus,
                      message: String| {
            debug!(
                "Levenberg-Marquardt stopped after {} iterations: {} (cost {:.6e})",
                iterations, message, cost
            );
            LmResult {
                params,
                residuals,
                cost,
                iterations,
                func_evals,
                status,
                message,
            }
        };

        if !cost.is_finite() {
            warn!("Model cannot be evaluated at the initial parameters");
            return Ok(finish(
                params,
                residuals,
                cost,
                0,
                func_evals,
                ConvergenceStatus::NumericalError,
                "Non-finite residuals at the initial parameters".to_string(),
            ));
        }

        if n_params == 0 {
            return Ok(finish(
                params,
                residuals,
                cost,
                0,
                func_evals,
                ConvergenceStatus::ParameterConvergence,
                "No varying parameters".to_string(),
            ));
        }

        let mut lambda = self.config.initial_lambda;
        let mut scale = Array1::from_elem(n_params, MIN_SCALE);
        let mut iterations = 0;

        loop {
            if criteria.exhausted(iterations) {
                let message = format!("Maximum iterations ({}) reached", self.config.max_iterations);
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::MaxIterationsReached,
                    message,
                ));
            }
            iterations += 1;

            let jacobian = problem.jacobian(&params)?;
            if !problem.has_custom_jacobian() {
                func_evals += n_params;
            }
            if jacobian.iter().any(|v| !v.is_finite()) {
                warn!("Non-finite Jacobian at iteration {}", iterations);
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::NumericalError,
                    "Non-finite Jacobian".to_string(),
                ));
            }

            let jtj = jacobian.t().dot(&jacobian);
            let gradient = jacobian.t().dot(&residuals);
            if jtj.iter().chain(gradient.iter()).any(|v| !v.is_finite()) {
                warn!("Normal equations overflow at iteration {}", iterations);
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::NumericalError,
                    "Non-finite normal equations".to_string(),
                ));
            }

            if cost == 0.0 || gradient.iter().all(|&g| g == 0.0) {
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    ConvergenceStatus::GradientConvergence,
                    "Gradient vanished".to_string(),
                ));
            }

            match self.config.scaling {
                DampingScaling::Scaled => {
                    for j in 0..n_params {
                        scale[j] = scale[j].max(jtj[[j, j]]);
                    }
                }
                DampingScaling::Unscaled => scale.fill(1.0),
            }

            // Retry with growing damping until a step lowers the cost.
            loop {
                let step = match self.calculate_step(&jtj, &gradient, &scale, lambda) {
                    Ok(step) => step,
                    Err(_) => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            warn!("Singular normal equations at iteration {}", iterations);
                            return Ok(finish(
                                params,
                                residuals,
                                cost,
                                iterations,
                                func_evals,
                                ConvergenceStatus::NumericalError,
                                "Singular normal equations".to_string(),
                            ));
                        }
                        continue;
                    }
                };

                let mut new_params = &params + &step;
                problem.project(&mut new_params);
                let taken = &new_params - &params;

                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost = sum_of_squares(&new_residuals);

                trace!(
                    "LM iteration {}: lambda {:.3e}, cost {:.6e} -> {:.6e}",
                    iterations,
                    lambda,
                    cost,
                    new_cost
                );

                let negligible = criteria.step_converged(&params, &taken);

                if new_cost.is_finite() && new_cost <= cost {
                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    on_iteration(iterations, cost);

                    if negligible {
                        return Ok(finish(
                            params,
                            residuals,
                            cost,
                            iterations,
                            func_evals,
                            ConvergenceStatus::ParameterConvergence,
                            "Parameter step below tolerance".to_string(),
                        ));
                    }
                    break;
                }

                if negligible {
                    // The cost cannot be lowered even by a vanishing step: at the minimum.
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        ConvergenceStatus::ParameterConvergence,
                        "No further decrease possible within tolerance".to_string(),
                    ));
                }

                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    warn!("Damping exceeded {:.1e} without lowering the cost", self.config.max_lambda);
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        ConvergenceStatus::NumericalError,
                        "Failed to decrease cost, and lambda reached maximum".to_string(),
                    ));
                }
            }
        }
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// This method solves the equation (J^T J + λ D²) δ = -J^T r, where:
    /// - J is the Jacobian matrix
    /// - r is the residual vector
    /// - λ is the damping parameter
    /// - D² is the scaling diagonal
    /// - δ is the step
    fn calculate_step(
        &self,
        jtj: &Array2<f64>,
        gradient: &Array1<f64>,
        scale: &Array1<f64>,
        lambda: f64,
    ) -> Result<Array1<f64>> {
        let mut a = jtj.clone();
        for i in 0..a.nrows() {
            a[[i, i]] += lambda * scale[i];
        }
        let rhs = gradient.mapv(|g| -g);
        solve_spd(&a, &rhs)
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// y = a * exp(-b * x), with an analytic Jacobian
    struct ExpProblem {
        x: Array1<f64>,
        y: Array1<f64>,
    }

    impl ExpProblem {
        fn new(a: f64, b: f64) -> Self {
            let x = Array1::linspace(0.0, 4.0, 20);
            let y = x.mapv(|v| a * (-b * v).exp());
            Self { x, y }
        }
    }

    impl Problem for ExpProblem {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (a, b) = (params[0], params[1]);
            Ok(self
                .x
                .iter()
                .zip(self.y.iter())
                .map(|(x, y)| a * (-b * x).exp() - y)
                .collect())
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            self.x.len()
        }

        fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
            let (a, b) = (params[0], params[1]);
            let mut jac = Array2::zeros((self.x.len(), 2));
            for (i, &x) in self.x.iter().enumerate() {
                let e = (-b * x).exp();
                jac[[i, 0]] = e;
                jac[[i, 1]] = -a * x * e;
            }
            Ok(jac)
        }

        fn has_custom_jacobian(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_scaled_and_unscaled_converge() {
        let problem = ExpProblem::new(5.0, 1.3);

        for scaling in [DampingScaling::Scaled, DampingScaling::Unscaled] {
            let lm = LevenbergMarquardt::new()
                .with_tolerance(1e-10)
                .with_scaling(scaling);
            let result = lm.minimize(&problem, array![1.0, 0.5]).unwrap();

            assert!(result.success(), "{:?}: {}", scaling, result.message);
            assert_relative_eq!(result.params[0], 5.0, epsilon = 1e-8);
            assert_relative_eq!(result.params[1], 1.3, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_iteration_cap() {
        let problem = ExpProblem::new(5.0, 1.3);
        let lm = LevenbergMarquardt::new()
            .with_tolerance(1e-12)
            .with_max_iterations(1);

        let mut seen = Vec::new();
        let result = lm
            .minimize_with_callback(&problem, array![1.0, 0.5], &mut |i, _| seen.push(i))
            .unwrap();

        assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 1);
        assert!(seen.len() <= 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let problem = ExpProblem::new(1.0, 1.0);
        let lm = LevenbergMarquardt::new();
        assert!(lm.minimize(&problem, array![1.0]).is_err());
    }

    #[test]
    fn test_non_finite_start_fails() {
        let problem = ExpProblem::new(1.0, 1.0);
        let lm = LevenbergMarquardt::new();
        let result = lm.minimize(&problem, array![f64::NAN, 1.0]).unwrap();
        assert_eq!(result.status, ConvergenceStatus::NumericalError);
        assert_eq!(result.iterations, 0);
    }

    /// `r = p * x - y` over abscissae large enough that `J^T J` overflows.
    struct Overflowing;

    impl Problem for Overflowing {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(array![params[0] * 1e200 - 1.0, params[0] * 2e200 - 2.0])
        }

        fn parameter_count(&self) -> usize {
            1
        }

        fn residual_count(&self) -> usize {
            2
        }

        fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
            Ok(array![[1e200], [2e200]])
        }

        fn has_custom_jacobian(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_overflowing_normal_equations_fail() {
        let lm = LevenbergMarquardt::new();
        let result = lm.minimize(&Overflowing, array![1e-200]).unwrap();
        assert_eq!(result.status, ConvergenceStatus::NumericalError);
        assert_eq!(result.iterations, 1);
        assert!(!result.message.is_empty());
    }
}
