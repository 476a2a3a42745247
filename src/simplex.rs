//! Nelder-Mead simplex minimization.
//!
//! Gradient-free: the cost `|r(p)|²` is sampled at the `n + 1` vertices of a
//! simplex that is reflected, expanded, contracted or shrunk toward the minimum.
//! Points where the model cannot be evaluated have infinite cost.

use log::{debug, trace};
use ndarray::Array1;
use std::cmp::Ordering;

use crate::error::{FitError, Result};
use crate::lm::convergence::{ConvergenceCriteria, ConvergenceStatus};
use crate::problem::Problem;

/// Reflection coefficient.
const ALPHA: f64 = 1.0;
/// Expansion coefficient.
const GAMMA: f64 = 2.0;
/// Contraction coefficient.
const RHO: f64 = 0.5;
/// Shrink coefficient.
const SIGMA: f64 = 0.5;

/// Relative size of the initial simplex.
const INITIAL_STEP: f64 = 0.05;
/// Initial step for parameters that start at zero.
const ZERO_STEP: f64 = 0.00025;

/// Result of a simplex minimization.
#[derive(Debug, Clone)]
pub struct SimplexResult {
    /// Best vertex found
    pub params: Array1<f64>,

    /// Cost at the best vertex
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Why the minimization stopped
    pub status: ConvergenceStatus,

    /// A message describing the result
    pub message: String,
}

/// The Nelder-Mead simplex optimizer.
#[derive(Debug, Clone)]
pub struct NelderMead {
    criteria: ConvergenceCriteria,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            criteria: ConvergenceCriteria::default(),
        }
    }
}

impl NelderMead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative tolerance on the spread of vertex costs.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.criteria.tolerance = tolerance;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.criteria.max_iterations = max_iterations;
        self
    }

    /// Minimize the sum of squared residuals of `problem`.
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<SimplexResult> {
        self.minimize_with_callback(problem, initial_params, &mut |_, _| {})
    }

    /// Like [`NelderMead::minimize`], calling `on_iteration(iteration, best_cost)`
    /// after every iteration.
    ///
    /// # Errors
    ///
    /// * `FitError::DimensionMismatch` if `initial_params` does not match the problem
    pub fn minimize_with_callback<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        on_iteration: &mut dyn FnMut(usize, f64),
    ) -> Result<SimplexResult> {
        let n = problem.parameter_count();
        if initial_params.len() != n {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n,
                initial_params.len()
            )));
        }

        let mut func_evals = 0;
        let mut cost = |p: &Array1<f64>| -> Result<f64> {
            func_evals += 1;
            let c = problem.eval_cost(p)?;
            Ok(if c.is_finite() { c } else { f64::INFINITY })
        };

        let mut start = initial_params;
        problem.project(&mut start);

        let mut vertices = Vec::with_capacity(n + 1);
        vertices.push(start.clone());
        for j in 0..n {
            let mut vertex = start.clone();
            vertex[j] = if start[j] != 0.0 {
                start[j] * (1.0 + INITIAL_STEP)
            } else {
                ZERO_STEP
            };
            problem.project(&mut vertex);
            if vertex[j] == start[j] {
                // Pinned against a bound; step the other way.
                vertex[j] = if start[j] != 0.0 {
                    start[j] * (1.0 - INITIAL_STEP)
                } else {
                    -ZERO_STEP
                };
                problem.project(&mut vertex);
            }
            vertices.push(vertex);
        }

        let mut values = vertices.iter().map(&mut cost).collect::<Result<Vec<f64>>>()?;

        if values[0].is_infinite() {
            return Ok(SimplexResult {
                params: start,
                cost: f64::NAN,
                iterations: 0,
                func_evals: n + 1,
                status: ConvergenceStatus::NumericalError,
                message: "Non-finite residuals at the initial parameters".to_string(),
            });
        }

        let mut iterations = 0;
        let status = loop {
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));
            vertices = order.iter().map(|&i| vertices[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            if n == 0 || self.criteria.spread_converged(values[0], values[n]) {
                break ConvergenceStatus::FunctionValueConvergence;
            }
            if self.criteria.exhausted(iterations) {
                break ConvergenceStatus::MaxIterationsReached;
            }
            iterations += 1;

            let centroid = vertices[..n]
                .iter()
                .fold(Array1::zeros(n), |acc, v| acc + v)
                / n as f64;

            let worst = vertices[n].clone();
            let mut reflected = &centroid + &((&centroid - &worst) * ALPHA);
            problem.project(&mut reflected);
            let f_reflected = cost(&reflected)?;

            if f_reflected < values[0] {
                let mut expanded = &centroid + &((&reflected - &centroid) * GAMMA);
                problem.project(&mut expanded);
                let f_expanded = cost(&expanded)?;
                if f_expanded < f_reflected {
                    vertices[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    vertices[n] = reflected;
                    values[n] = f_reflected;
                }
            } else if f_reflected < values[n - 1] {
                vertices[n] = reflected;
                values[n] = f_reflected;
            } else {
                let outside = f_reflected < values[n];
                let target = if outside { &reflected } else { &worst };
                let mut contracted = &centroid + &((target - &centroid) * RHO);
                problem.project(&mut contracted);
                let f_contracted = cost(&contracted)?;

                if f_contracted < values[n].min(f_reflected) {
                    vertices[n] = contracted;
                    values[n] = f_contracted;
                } else {
                    let best = vertices[0].clone();
                    for i in 1..=n {
                        let mut shrunk = &best + &((&vertices[i] - &best) * SIGMA);
                        problem.project(&mut shrunk);
                        values[i] = cost(&shrunk)?;
                        vertices[i] = shrunk;
                    }
                }
            }

            let best = values.iter().copied().fold(f64::INFINITY, f64::min);
            trace!("Simplex iteration {}: best cost {:.6e}", iterations, best);
            on_iteration(iterations, best);
        };

        let best = (0..=n)
            .min_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal))
            .unwrap_or(0);

        let message = match status {
            ConvergenceStatus::MaxIterationsReached => format!(
                "Maximum iterations ({}) reached",
                self.criteria.max_iterations
            ),
            _ => "Spread of simplex values below tolerance".to_string(),
        };
        debug!(
            "Simplex stopped after {} iterations: {} (cost {:.6e})",
            iterations, message, values[best]
        );

        drop(cost);
        Ok(SimplexResult {
            params: vertices[best].clone(),
            cost: values[best],
            iterations,
            func_evals,
            status,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Residuals of the Rosenbrock function: (1 - a, 10 (b - a²))
    struct Rosenbrock;

    impl Problem for Rosenbrock {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (a, b) = (params[0], params[1]);
            Ok(array![1.0 - a, 10.0 * (b - a * a)])
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_rosenbrock() {
        let simplex = NelderMead::new()
            .with_tolerance(1e-10)
            .with_max_iterations(5000);
        let result = simplex.minimize(&Rosenbrock, array![-1.2, 1.0]).unwrap();

        assert_eq!(result.status, ConvergenceStatus::FunctionValueConvergence);
        assert_relative_eq!(result.params[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_iteration_cap() {
        let simplex = NelderMead::new()
            .with_tolerance(1e-12)
            .with_max_iterations(3);
        let result = simplex.minimize(&Rosenbrock, array![-1.2, 1.0]).unwrap();

        assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 3);
    }
}
