//! # Uncertainty Calculation
//!
//! Parameter uncertainties at the solution of a fit: covariance matrix,
//! correlation matrix and standard errors, estimated from the Jacobian of the
//! weighted residuals.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, expand_covariance,
    standard_errors_from_covariance,
};

use log::warn;
use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};

/// Structure to hold uncertainty calculation results.
///
/// Matrices and vectors span every model parameter; fixed parameters carry
/// zero variance.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyResult {
    /// Covariance matrix for the parameters
    pub covariance: Array2<f64>,
    /// Standard errors for each parameter
    pub standard_errors: Array1<f64>,
    /// Correlation matrix derived from covariance
    pub correlation: Array2<f64>,
}

impl UncertaintyResult {
    /// All-zero uncertainties, used when the covariance cannot be estimated.
    pub fn zeros(n_params: usize) -> Self {
        Self {
            covariance: Array2::zeros((n_params, n_params)),
            standard_errors: Array1::zeros(n_params),
            correlation: Array2::eye(n_params),
        }
    }
}

/// Estimate parameter uncertainties from the Jacobian at the solution.
///
/// # Arguments
///
/// * `jacobian` - Jacobian of the weighted residuals over the varying parameters
/// * `varying` - Index of each Jacobian column in the full parameter vector
/// * `n_params` - Total number of model parameters
/// * `scale` - Factor applied to `inv(J^T J)`, the reduced chi-square or 1
///
/// # Errors
///
/// * `FitError::SingularMatrix` if the Jacobian or scale is not finite, or
///   `J^T J` cannot be inverted
pub fn uncertainty_from_jacobian(
    jacobian: &Array2<f64>,
    varying: &[usize],
    n_params: usize,
    scale: f64,
) -> Result<UncertaintyResult> {
    if varying.is_empty() {
        return Ok(UncertaintyResult::zeros(n_params));
    }
    if !scale.is_finite() || jacobian.iter().any(|v| !v.is_finite()) {
        return Err(FitError::SingularMatrix);
    }

    let covar = calculate_covariance(jacobian, scale)?;
    if covar.iter().any(|v| !v.is_finite()) {
        warn!("Covariance matrix has non-finite entries");
    }

    let covariance = expand_covariance(&covar, varying, n_params);
    let standard_errors = standard_errors_from_covariance(&covariance);
    let correlation = calculate_correlation(&covariance);

    Ok(UncertaintyResult {
        covariance,
        standard_errors,
        correlation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_straight_line_uncertainty() {
        // d(residual)/d(slope, intercept) for x = 0..3
        let jac = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0]];
        let result = uncertainty_from_jacobian(&jac, &[0, 1], 2, 1.0).unwrap();

        // J^T J = [[14, 6], [6, 4]], det = 20
        assert_relative_eq!(result.covariance[[0, 0]], 4.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(result.standard_errors[1], (14.0f64 / 20.0).sqrt(), epsilon = 1e-12);
        assert!(result.correlation[[0, 1]] < 0.0);
    }

    #[test]
    fn test_all_fixed() {
        let jac = Array2::zeros((3, 0));
        let result = uncertainty_from_jacobian(&jac, &[], 2, 1.0).unwrap();
        assert_eq!(result, UncertaintyResult::zeros(2));
    }

    #[test]
    fn test_non_finite_jacobian_is_rejected() {
        let jac = array![[f64::NAN, 1.0], [1.0, 1.0], [2.0, 1.0]];
        assert!(matches!(
            uncertainty_from_jacobian(&jac, &[0, 1], 2, 1.0),
            Err(FitError::SingularMatrix)
        ));

        let jac = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0]];
        assert!(uncertainty_from_jacobian(&jac, &[0, 1], 2, f64::NAN).is_err());
    }
}
