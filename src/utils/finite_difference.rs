//! Finite difference methods for numerical differentiation.
//!
//! Used whenever a model has no analytic Jacobian: user-defined expressions,
//! plugins that ask for numeric differencing, and the covariance estimate of a
//! simplex fit.

use crate::error::{FitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default relative step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Step for parameter `value`, relative to its magnitude.
fn step_size(value: f64, eps: f64) -> f64 {
    if value.abs() > 1.0 {
        value.abs() * eps.sqrt()
    } else {
        eps.sqrt()
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The relative precision of a residual evaluation (optional);
///   the step is its square root
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON * DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;

    if residuals.len() != n_residuals {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));

    for j in 0..n_params {
        let h = step_size(params[j], eps);

        // Step backwards if the forward point cannot be evaluated, e.g. at an upper bound.
        let mut perturbed = params.clone();
        perturbed[j] += h;
        let mut forward = problem.eval(&perturbed)?;
        let mut signed_h = h;

        if forward.iter().any(|r| !r.is_finite()) || forward == residuals {
            perturbed[j] = params[j] - h;
            forward = problem.eval(&perturbed)?;
            signed_h = -h;
        }

        for i in 0..n_residuals {
            jac[[i, j]] = (forward[i] - residuals[i]) / signed_h;
        }
    }

    Ok(jac)
}
