//! Exponential decay and growth models.
//!
//! Decay with up to three terms:
//!
//! f(x) = y0 + A1*exp(-x/t1) + A2*exp(-x/t2) + A3*exp(-x/t3)
//!
//! Growth:
//!
//! f(x) = y0 + A1*exp(x/t1)
//!
//! Parameters are laid out as `[A1, t1, A2, t2, ..., y0]`.

use crate::data::FilteredData;
use crate::models::sorted_points;

/// Largest number of decay terms.
pub const MAX_TERMS: usize = 3;

pub(crate) fn clamp_terms(terms: usize) -> usize {
    terms.clamp(1, MAX_TERMS)
}

pub(crate) fn names(terms: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(2 * terms + 1);
    for k in 1..=terms {
        names.push(format!("A{}", k));
        names.push(format!("t{}", k));
    }
    names.push("y0".to_string());
    names
}

pub(crate) fn decay_formula(terms: usize) -> String {
    let terms: Vec<String> = (1..=terms)
        .map(|k| format!("A{}*exp(-x/t{})", k, k))
        .collect();
    format!("y = y0 + {}", terms.join(" + "))
}

pub(crate) fn growth_formula() -> String {
    "y = y0 + A1*exp(x/t1)".to_string()
}

/// `sign` is -1 for decay and +1 for growth.
pub(crate) fn value(x: f64, params: &[f64], sign: f64) -> f64 {
    let terms = params.len() / 2;
    let y0 = params[2 * terms];
    (0..terms).fold(y0, |acc, k| {
        let (a, t) = (params[2 * k], params[2 * k + 1]);
        acc + a * (sign * x / t).exp()
    })
}

pub(crate) fn jacobian(x: f64, params: &[f64], sign: f64, out: &mut [f64]) -> bool {
    let terms = params.len() / 2;
    for k in 0..terms {
        let (a, t) = (params[2 * k], params[2 * k + 1]);
        if t == 0.0 {
            return false;
        }
        let e = (sign * x / t).exp();
        out[2 * k] = e;
        // d/dt exp(s x / t) = -s x / t² exp(s x / t)
        out[2 * k + 1] = -a * e * sign * x / (t * t);
    }
    out[2 * terms] = 1.0;
    true
}

/// Decay guess: baseline from the right edge, amplitude and time constant from a
/// log-linear fit of the baseline-corrected signal.
pub(crate) fn decay_guess(data: &FilteredData, terms: usize) -> Vec<f64> {
    let points = sorted_points(data);
    let (first, last) = match (points.first(), points.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return flat_guess(terms, 0.0, 1.0),
    };
    let span = last.0 - first.0;
    let default_t = if span > 0.0 { span / 3.0 } else { 1.0 };

    if first.1 == last.1 {
        return flat_guess(terms, last.1, default_t);
    }
    let sign = (first.1 - last.1).signum();
    let y0 = last.1 - sign * 0.01 * (first.1 - last.1).abs();

    let (a, t) = match log_linear_fit(&points, y0, sign) {
        Some((slope, intercept)) if slope < 0.0 => {
            let t = -1.0 / slope;
            let a = sign * intercept.exp();
            if a.is_finite() && t.is_finite() {
                (a, t)
            } else {
                (first.1 - y0, default_t)
            }
        }
        _ => (first.1 - y0, default_t),
    };

    spread_terms(terms, a, t, y0)
}

/// Growth guess: baseline from the left edge, rate from a log-linear fit.
pub(crate) fn growth_guess(data: &FilteredData) -> Vec<f64> {
    let points = sorted_points(data);
    let (first, last) = match (points.first(), points.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return flat_guess(1, 0.0, 1.0),
    };
    let span = last.0 - first.0;
    let default_t = if span > 0.0 { span / 3.0 } else { 1.0 };

    if first.1 == last.1 {
        return flat_guess(1, first.1, default_t);
    }
    let sign = (last.1 - first.1).signum();
    let y0 = first.1 - sign * 0.01 * (last.1 - first.1).abs();

    if let Some((slope, intercept)) = log_linear_fit(&points, y0, sign) {
        let t = 1.0 / slope;
        let a = sign * intercept.exp();
        if slope > 0.0 && a.is_finite() && t.is_finite() {
            return vec![a, t, y0];
        }
    }
    vec![last.1 - y0, default_t, y0]
}

fn flat_guess(terms: usize, y0: f64, t: f64) -> Vec<f64> {
    spread_terms(terms, 0.0, t, y0)
}

/// Split one amplitude over `terms` components with time constants spread
/// geometrically around `t`.
fn spread_terms(terms: usize, a: f64, t: f64, y0: f64) -> Vec<f64> {
    let mut params = Vec::with_capacity(2 * terms + 1);
    for k in 0..terms {
        let exponent = 2.0 * k as f64 - (terms as f64 - 1.0);
        params.push(a / terms as f64);
        params.push(t * 2f64.powf(exponent));
    }
    params.push(y0);
    params
}

/// Regress `ln(sign * (y - y0))` on x over the points where it is defined.
///
/// Returns `(slope, intercept)`.
fn log_linear_fit(points: &[(f64, f64)], y0: f64, sign: f64) -> Option<(f64, f64)> {
    let samples: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|&(x, y)| {
            let z = sign * (y - y0);
            (z > 0.0).then(|| (x, z.ln()))
        })
        .collect();
    if samples.len() < 2 {
        return None;
    }

    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.0).sum::<f64>() / n;
    let mean_z = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let sxx: f64 = samples.iter().map(|s| (s.0 - mean_x).powi(2)).sum();
    let sxz: f64 = samples
        .iter()
        .map(|s| (s.0 - mean_x) * (s.1 - mean_z))
        .sum();
    if sxx == 0.0 {
        return None;
    }

    let slope = sxz / sxx;
    Some((slope, mean_z - slope * mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    #[test]
    fn test_decay_value_and_names() {
        let params = [2.0, 1.0, 0.5];
        assert_relative_eq!(value(0.0, &params, -1.0), 2.5);
        assert_relative_eq!(value(1.0, &params, -1.0), 0.5 + 2.0 * (-1.0f64).exp());
        assert_eq!(names(2), vec!["A1", "t1", "A2", "t2", "y0"]);
    }

    #[test]
    fn test_jacobian_matches_difference_quotient() {
        let params = [3.0, 2.0, 1.0, 0.5, 0.2];
        let mut out = [0.0; 5];
        assert!(jacobian(1.3, &params, -1.0, &mut out));

        let h = 1e-7;
        for j in 0..5 {
            let mut p = params;
            p[j] += h;
            let numeric = (value(1.3, &p, -1.0) - value(1.3, &params, -1.0)) / h;
            assert_relative_eq!(out[j], numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_zero_time_constant_declines_jacobian() {
        let mut out = [0.0; 3];
        assert!(!jacobian(1.0, &[1.0, 0.0, 0.0], -1.0, &mut out));
    }

    #[test]
    fn test_decay_guess_near_truth() {
        let x = Array1::linspace(0.0, 10.0, 40);
        let y = x.mapv(|v: f64| 1.0 + 5.0 * (-v / 2.0).exp());
        let data = FilteredData::from_arrays("decay", x, y).unwrap();

        let guess = decay_guess(&data, 1);
        assert_eq!(guess.len(), 3);
        assert!(guess[0] > 2.5 && guess[0] < 10.0, "A1 = {}", guess[0]);
        assert!(guess[1] > 1.0 && guess[1] < 4.0, "t1 = {}", guess[1]);
        assert!((guess[2] - 1.0).abs() < 0.2, "y0 = {}", guess[2]);
    }

    #[test]
    fn test_growth_guess_sign() {
        let x = Array1::linspace(0.0, 3.0, 30);
        let y = x.mapv(|v: f64| 0.5 + 0.2 * (v / 1.5).exp());
        let data = FilteredData::from_arrays("growth", x, y).unwrap();

        let guess = growth_guess(&data);
        assert!(guess[0] > 0.0);
        assert!(guess[1] > 0.0);
    }

    #[test]
    fn test_multi_term_spread() {
        let guess = spread_terms(3, 3.0, 4.0, 1.0);
        assert_eq!(guess, vec![1.0, 1.0, 1.0, 4.0, 1.0, 16.0, 1.0]);
    }
}
