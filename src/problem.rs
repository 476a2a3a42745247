//! Problem definition trait and the weighted residual problem built for a fit.
//!
//! The optimizers only see the `Problem` trait: a residual vector as a function
//! of the varying parameters. [`ResidualProblem`] binds a model, the filtered
//! data, the weights and the fixed/bounded parameter layout into one.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::model::{JacobianSource, ModelFunction};
use crate::parameters::Parameters;
use crate::utils::finite_difference;

/// A trait representing a nonlinear least squares problem.
///
/// This trait defines the interface the Levenberg-Marquardt and simplex
/// optimizers work against.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals. Entries may be non-finite when the model cannot be
    ///   evaluated at `params`; optimizers treat such points as infeasible.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The Jacobian is the matrix of partial derivatives of the residuals with respect
    /// to the parameters.
    ///
    /// # Default Implementation
    ///
    /// Forward finite differences.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        finite_difference::jacobian(self, params, None)
    }

    /// Check if this problem provides an analytic Jacobian.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Move `params` into the feasible region, e.g. clamp them into bounds.
    ///
    /// The default leaves them untouched.
    fn project(&self, _params: &mut Array1<f64>) {}

    /// Evaluate the sum of squared residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the cost
    ///
    /// # Returns
    ///
    /// * The cost value (sum of squared residuals), non-finite if any residual is
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// Weighted residuals of a model against filtered data.
///
/// `residual_i = sqrt(w_i) * (y_i - f(x_i, p))`, so the cost is
/// `chi² = Σ w_i (y_i - f(x_i, p))²`. The optimizer's vector holds only the
/// varying parameters; fixed ones are filled in from `params`, and every value is
/// clamped into its bounds before the model sees it.
pub struct ResidualProblem<'a> {
    model: &'a dyn ModelFunction,
    x: &'a Array1<f64>,
    y: &'a Array1<f64>,
    sqrt_weights: Array1<f64>,
    params: &'a Parameters,
    varying: Vec<usize>,
}

impl<'a> ResidualProblem<'a> {
    /// Bind a model to data, weights and a parameter layout.
    ///
    /// # Errors
    ///
    /// * `FitError::DimensionMismatch` if the columns, the weights and the model's
    ///   parameter count disagree
    pub fn new(
        model: &'a dyn ModelFunction,
        x: &'a Array1<f64>,
        y: &'a Array1<f64>,
        weights: &Array1<f64>,
        params: &'a Parameters,
    ) -> Result<Self> {
        if x.len() != y.len() || x.len() != weights.len() {
            return Err(FitError::DimensionMismatch(format!(
                "x has {} points, y {} and weights {}",
                x.len(),
                y.len(),
                weights.len()
            )));
        }
        if params.len() != model.parameter_count() {
            return Err(FitError::DimensionMismatch(format!(
                "model '{}' takes {} parameters, got {}",
                model.name(),
                model.parameter_count(),
                params.len()
            )));
        }

        Ok(Self {
            model,
            x,
            y,
            sqrt_weights: weights.mapv(f64::sqrt),
            params,
            varying: params.varying_indices(),
        })
    }

    /// The full parameter vector for a vector of varying values.
    pub fn full_parameters(&self, varying: &Array1<f64>) -> Vec<f64> {
        self.params.expand(varying)
    }

    /// Model values at the data points for the given varying values.
    pub fn model_values(&self, varying: &Array1<f64>) -> Array1<f64> {
        let full = self.full_parameters(varying);
        self.x.mapv(|x| self.model.evaluate(x, &full))
    }

    /// Unweighted residuals `y - f`.
    pub fn raw_residuals(&self, varying: &Array1<f64>) -> Array1<f64> {
        self.y - &self.model_values(varying)
    }

    pub fn sqrt_weights(&self) -> &Array1<f64> {
        &self.sqrt_weights
    }
}

impl<'a> Problem for ResidualProblem<'a> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != self.varying.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.varying.len(),
                params.len()
            )));
        }
        Ok(&self.sqrt_weights * &self.raw_residuals(params))
    }

    fn parameter_count(&self) -> usize {
        self.varying.len()
    }

    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        if !self.has_custom_jacobian() {
            return finite_difference::jacobian(self, params, None);
        }

        let full = self.full_parameters(params);
        let mut row = vec![0.0; full.len()];
        let mut jac = Array2::zeros((self.x.len(), self.varying.len()));

        for (i, &x) in self.x.iter().enumerate() {
            if !self.model.jacobian(x, &full, &mut row) {
                // The model declined this point; fall back for the whole matrix.
                return finite_difference::jacobian(self, params, None);
            }
            for (k, &j) in self.varying.iter().enumerate() {
                jac[[i, k]] = -self.sqrt_weights[i] * row[j];
            }
        }

        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        self.model.jacobian_source() == JacobianSource::Analytic
    }

    fn project(&self, params: &mut Array1<f64>) {
        self.params.clamp_varying(params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuiltinModel;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_weighted_residuals() {
        let model = BuiltinModel::Linear;
        let x = array![0.0, 1.0, 2.0];
        let y = array![1.0, 3.0, 6.0];
        let w = array![1.0, 4.0, 1.0];
        let params = Parameters::from_values(&["slope", "intercept"], &[2.0, 1.0]);

        let problem = ResidualProblem::new(&model, &x, &y, &w, &params).unwrap();
        let r = problem.eval(&array![2.0, 1.0]).unwrap();

        assert_relative_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.0);
        assert_relative_eq!(r[2], 1.0);
        assert_relative_eq!(problem.eval_cost(&array![2.0, 0.0]).unwrap(), 1.0 + 4.0 + 4.0);
    }

    #[test]
    fn test_fixed_parameter_is_not_optimized() {
        let model = BuiltinModel::Linear;
        let x = array![0.0, 1.0, 2.0];
        let y = array![1.0, 3.0, 5.0];
        let w = Array1::ones(3);
        let mut params = Parameters::from_values(&["slope", "intercept"], &[2.0, 1.0]);
        params.get_mut("intercept").unwrap().set_vary(false);

        let problem = ResidualProblem::new(&model, &x, &y, &w, &params).unwrap();
        assert_eq!(problem.parameter_count(), 1);

        let jac = problem.jacobian(&array![2.0]).unwrap();
        assert_eq!(jac.shape(), &[3, 1]);
        assert_relative_eq!(jac[[2, 0]], -2.0);
    }

    #[test]
    fn test_analytic_matches_numeric_jacobian() {
        let model = BuiltinModel::Boltzmann;
        let x = Array1::linspace(-5.0, 5.0, 11);
        let y = x.mapv(|v| model.evaluate(v, &[1.0, 3.0, 0.5, 1.2]));
        let w = Array1::ones(11);
        let params = Parameters::from_values(&model.parameter_names(), &[1.2, 2.5, 0.0, 1.0]);

        let problem = ResidualProblem::new(&model, &x, &y, &w, &params).unwrap();
        let p = params.varying_array();
        let analytic = problem.jacobian(&p).unwrap();
        let numeric = finite_difference::jacobian(&problem, &p, None).unwrap();

        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_relative_eq!(*a, *n, epsilon = 1e-5);
        }
    }
}
