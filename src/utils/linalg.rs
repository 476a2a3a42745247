//! Dense symmetric solves on top of nalgebra.

use nalgebra::{Cholesky, DMatrix, Dyn, SVD};
use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// Relative singular value cutoff for the pseudo-inverse.
const PINV_RCOND: f64 = 1e-12;

/// Sweep limit for the SVD; nalgebra's unbounded variant never returns on some inputs.
const SVD_MAX_ITERATIONS: usize = 1000;

fn all_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

/// Largest absolute entry, used to bring a matrix to unit scale.
fn max_abs<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

fn svd(mat: DMatrix<f64>) -> Result<SVD<f64, Dyn, Dyn>> {
    let svd = SVD::try_new(mat, true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or(FitError::SingularMatrix)?;
    if all_finite(svd.singular_values.iter()) {
        Ok(svd)
    } else {
        Err(FitError::SingularMatrix)
    }
}

/// Solve `a x = b` for a symmetric positive definite `a`.
///
/// # Errors
///
/// * `FitError::SingularMatrix` if the input is not finite or the Cholesky
///   factorization fails
pub fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if !all_finite(a.iter()) || !all_finite(b.iter()) {
        return Err(FitError::SingularMatrix);
    }
    let chol = Cholesky::new(ndarray_to_nalgebra(a)).ok_or(FitError::SingularMatrix)?;
    let x = chol.solve(&ndarray_vec_to_nalgebra(b));
    if all_finite(x.iter()) {
        Ok(nalgebra_vec_to_ndarray(&x))
    } else {
        Err(FitError::SingularMatrix)
    }
}

/// Invert a symmetric positive semi-definite matrix.
///
/// The matrix is divided by its largest entry before factorizing, so entries
/// near the top of the `f64` range do not overflow. Tries Cholesky first and
/// falls back to an SVD pseudo-inverse for rank-deficient input.
///
/// # Errors
///
/// * `FitError::SingularMatrix` if the input is not finite or neither
///   factorization produces a finite inverse
pub fn invert_symmetric(a: &Array2<f64>) -> Result<Array2<f64>> {
    if !all_finite(a.iter()) {
        return Err(FitError::SingularMatrix);
    }
    let norm = max_abs(a.iter());
    if norm == 0.0 {
        return Ok(Array2::zeros(a.raw_dim()));
    }
    let mat = ndarray_to_nalgebra(a) / norm;

    if let Some(chol) = Cholesky::new(mat.clone()) {
        let inv = chol.inverse() / norm;
        if all_finite(inv.iter()) {
            return Ok(nalgebra_to_ndarray(&inv));
        }
    }

    let svd = svd(mat)?;
    let max_sv = max_abs(svd.singular_values.iter());
    let inv = svd
        .pseudo_inverse(max_sv * PINV_RCOND)
        .map_err(|_| FitError::SingularMatrix)?
        / norm;

    if all_finite(inv.iter()) {
        Ok(nalgebra_to_ndarray(&inv))
    } else {
        Err(FitError::SingularMatrix)
    }
}

/// Linear least squares `min |a x - b|` through the SVD.
///
/// # Errors
///
/// * `FitError::SingularMatrix` if the input is not finite or the system has
///   no usable solution
pub fn least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if !all_finite(a.iter()) || !all_finite(b.iter()) {
        return Err(FitError::SingularMatrix);
    }
    let a_norm = max_abs(a.iter());
    if a_norm == 0.0 {
        return Err(FitError::SingularMatrix);
    }
    let b_norm = max_abs(b.iter());
    if b_norm == 0.0 {
        return Ok(Array1::zeros(a.ncols()));
    }

    // (a / a_norm) x' = b / b_norm with x = x' * b_norm / a_norm
    let svd = svd(ndarray_to_nalgebra(a) / a_norm)?;
    let max_sv = max_abs(svd.singular_values.iter());
    let rhs = ndarray_vec_to_nalgebra(b) / b_norm;
    let x = svd
        .solve(&rhs, max_sv * PINV_RCOND)
        .map_err(|_| FitError::SingularMatrix)?
        * (b_norm / a_norm);

    if all_finite(x.iter()) {
        Ok(nalgebra_vec_to_ndarray(&x))
    } else {
        Err(FitError::SingularMatrix)
    }
}
