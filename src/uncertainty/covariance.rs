//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating and manipulating covariance
//! matrices from Jacobian matrices in nonlinear least-squares optimization.

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::utils::linalg::invert_symmetric;

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = scale * inv(J^T * J)
/// where:
///   - J is the Jacobian of the weighted residuals
///   - scale is the reduced chi-square (chi^2 / dof) when errors are rescaled, else 1
///
/// # Errors
///
/// * `FitError::SingularMatrix` if `J^T J` cannot be inverted even by pseudo-inverse
pub fn calculate_covariance(jacobian: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    let inv = invert_symmetric(&jtj)?;
    Ok(inv * scale)
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
///
/// Rows of parameters with zero variance (fixed parameters) are zero except
/// for the diagonal.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

/// Embed the covariance of the varying parameters into the full parameter space.
///
/// Fixed parameters get zero rows and columns.
pub fn expand_covariance(varying_covar: &Array2<f64>, varying: &[usize], n_params: usize) -> Array2<f64> {
    let mut full = Array2::zeros((n_params, n_params));
    for (a, &i) in varying.iter().enumerate() {
        for (b, &j) in varying.iter().enumerate() {
            full[[i, j]] = varying_covar[[a, b]];
        }
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        let jacobian = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let covar = calculate_covariance(&jacobian, 2.0).unwrap();

        // J^T J = [[35, 44], [44, 56]], det = 24
        assert_eq!(covar.shape(), &[2, 2]);
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 0]], covar[[0, 1]], epsilon = 1e-12);
        assert_relative_eq!(covar[[1, 1]], 2.0 * 35.0 / 24.0, epsilon = 1e-10);
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);

        let correl = calculate_correlation(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors_and_expansion() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);
        let full = expand_covariance(&covar, &[0, 2], 3);

        assert_eq!(full[[2, 0]], 0.05);
        assert_eq!(full[[1, 1]], 0.0);

        let errors = standard_errors_from_covariance(&full);
        assert_relative_eq!(errors[0], 0.1f64.sqrt(), epsilon = 1e-12);
        assert_eq!(errors[1], 0.0);
        assert_relative_eq!(errors[2], 0.2f64.sqrt(), epsilon = 1e-12);
    }
}
