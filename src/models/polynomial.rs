//! Linear and polynomial models.
//!
//! f(x) = a0 + a1*x + a2*x^2 + ... + aN*x^N
//!
//! Both are linear in their parameters, so the initial guess is the exact linear
//! least-squares solution and the optimizer only has to confirm it.

use ndarray::Array2;

use crate::data::FilteredData;
use crate::utils::least_squares;

/// Lowest supported polynomial order.
pub const MIN_ORDER: usize = 1;
/// Highest supported polynomial order.
pub const MAX_ORDER: usize = 9;

pub(crate) fn clamp_order(order: usize) -> usize {
    order.clamp(MIN_ORDER, MAX_ORDER)
}

pub(crate) fn polynomial_names(order: usize) -> Vec<String> {
    (0..=order).map(|i| format!("a{}", i)).collect()
}

pub(crate) fn polynomial_formula(order: usize) -> String {
    let mut terms = vec!["a0".to_string(), "a1*x".to_string()];
    terms.extend((2..=order).map(|i| format!("a{}*x^{}", i, i)));
    format!("y = {}", terms.join(" + "))
}

/// Horner evaluation of `coeffs[0] + coeffs[1] x + ...`.
pub(crate) fn polynomial_value(x: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// `df/da_k = x^k`
pub(crate) fn polynomial_jacobian(x: f64, out: &mut [f64]) {
    let mut power = 1.0;
    for d in out.iter_mut() {
        *d = power;
        power *= x;
    }
}

/// Least-squares coefficients `a0..aN`, or zeros if the system is degenerate.
pub(crate) fn polynomial_guess(data: &FilteredData, order: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 {
        return fallback(data, order);
    }
    let mut design = Array2::zeros((n, order + 1));
    for (i, &x) in data.x().iter().enumerate() {
        let mut row = vec![0.0; order + 1];
        polynomial_jacobian(x, &mut row);
        for (j, v) in row.into_iter().enumerate() {
            design[[i, j]] = v;
        }
    }

    match least_squares(&design, data.y()) {
        Ok(coeffs) if coeffs.iter().all(|c| c.is_finite()) => coeffs.to_vec(),
        _ => fallback(data, order),
    }
}

fn fallback(data: &FilteredData, order: usize) -> Vec<f64> {
    let mut coeffs = vec![0.0; order + 1];
    if !data.is_empty() {
        coeffs[0] = data.y().mean().unwrap_or(0.0);
    }
    coeffs
}

/// `[slope, intercept]` from the order-1 least-squares line.
pub(crate) fn linear_guess(data: &FilteredData) -> Vec<f64> {
    let coeffs = polynomial_guess(data, 1);
    vec![coeffs[1], coeffs[0]]
}
