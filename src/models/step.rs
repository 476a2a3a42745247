//! Sigmoidal step models.
//!
//! Boltzmann:
//!
//! f(x) = A2 + (A1 - A2) / (1 + exp((x - x0) / dx))
//!
//! Logistic (dose-response):
//!
//! f(x) = A2 + (A1 - A2) / (1 + (x / x0)^p)
//!
//! Both move from the plateau `A1` to the plateau `A2` around the midpoint `x0`.

use crate::data::FilteredData;
use crate::models::sorted_points;

pub(crate) fn boltzmann_names() -> Vec<String> {
    ["A1", "A2", "x0", "dx"].iter().map(|s| s.to_string()).collect()
}

pub(crate) fn logistic_names() -> Vec<String> {
    ["A1", "A2", "x0", "p"].iter().map(|s| s.to_string()).collect()
}

pub(crate) fn boltzmann_value(x: f64, params: &[f64]) -> f64 {
    let (a1, a2, x0, dx) = (params[0], params[1], params[2], params[3]);
    a2 + (a1 - a2) / (1.0 + ((x - x0) / dx).exp())
}

pub(crate) fn boltzmann_jacobian(x: f64, params: &[f64], out: &mut [f64]) -> bool {
    let (a1, a2, x0, dx) = (params[0], params[1], params[2], params[3]);
    if dx == 0.0 {
        return false;
    }
    let s = 1.0 / (1.0 + ((x - x0) / dx).exp());
    // s² e written as s (1 - s) stays finite when e overflows.
    let slope = (a1 - a2) * s * (1.0 - s);
    out[0] = s;
    out[1] = 1.0 - s;
    out[2] = slope / dx;
    out[3] = slope * (x - x0) / (dx * dx);
    true
}

pub(crate) fn logistic_value(x: f64, params: &[f64]) -> f64 {
    let (a1, a2, x0, p) = (params[0], params[1], params[2], params[3]);
    a2 + (a1 - a2) / (1.0 + (x / x0).powf(p))
}

pub(crate) fn logistic_jacobian(x: f64, params: &[f64], out: &mut [f64]) -> bool {
    let (a1, a2, x0, p) = (params[0], params[1], params[2], params[3]);
    let ratio = x / x0;
    if x0 == 0.0 || ratio < 0.0 {
        return false;
    }
    let u = ratio.powf(p);
    let s = 1.0 / (1.0 + u);
    let slope = (a1 - a2) * s * (1.0 - s);
    out[0] = s;
    out[1] = 1.0 - s;
    out[2] = slope * p / x0;
    out[3] = if u == 0.0 { 0.0 } else { -slope * ratio.ln() };
    true
}

/// Plateaus from the two edges, midpoint where the signal crosses half height.
fn plateaus_and_midpoint(data: &FilteredData) -> Option<(f64, f64, f64, f64)> {
    let points = sorted_points(data);
    let first = *points.first()?;
    let last = *points.last()?;
    let half = 0.5 * (first.1 + last.1);

    let x0 = points
        .windows(2)
        .find(|w| (w[0].1 - half) * (w[1].1 - half) <= 0.0)
        .map(|w| {
            let dy = w[1].1 - w[0].1;
            if dy == 0.0 {
                w[0].0
            } else {
                w[0].0 + (half - w[0].1) * (w[1].0 - w[0].0) / dy
            }
        })
        .unwrap_or(0.5 * (first.0 + last.0));

    Some((first.1, last.1, x0, last.0 - first.0))
}

pub(crate) fn boltzmann_guess(data: &FilteredData) -> Vec<f64> {
    match plateaus_and_midpoint(data) {
        Some((a1, a2, x0, span)) => {
            let dx = if span > 0.0 { span / 10.0 } else { 1.0 };
            vec![a1, a2, x0, dx]
        }
        None => vec![0.0, 1.0, 0.0, 1.0],
    }
}

pub(crate) fn logistic_guess(data: &FilteredData) -> Vec<f64> {
    match plateaus_and_midpoint(data) {
        Some((a1, a2, x0, _)) => {
            let x0 = if x0 > 0.0 {
                x0
            } else {
                data.x_span().map_or(1.0, |(_, max)| (max * 0.5).max(1.0))
            };
            vec![a1, a2, x0, 2.0]
        }
        None => vec![0.0, 1.0, 1.0, 2.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn check_jacobian(
        value: fn(f64, &[f64]) -> f64,
        jacobian: fn(f64, &[f64], &mut [f64]) -> bool,
        x: f64,
        params: [f64; 4],
    ) {
        let mut out = [0.0; 4];
        assert!(jacobian(x, &params, &mut out));
        let h = 1e-7;
        for j in 0..4 {
            let mut p = params;
            p[j] += h;
            let numeric = (value(x, &p) - value(x, &params)) / h;
            assert_relative_eq!(out[j], numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_boltzmann_midpoint() {
        assert_relative_eq!(boltzmann_value(2.0, &[0.0, 4.0, 2.0, 0.5]), 2.0);
        check_jacobian(boltzmann_value, boltzmann_jacobian, 1.7, [1.0, 3.0, 2.0, 0.5]);
    }

    #[test]
    fn test_boltzmann_jacobian_far_tail_is_finite() {
        let mut out = [0.0; 4];
        assert!(boltzmann_jacobian(1e4, &[1.0, 3.0, 0.0, 0.5], &mut out));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_logistic() {
        assert_relative_eq!(logistic_value(3.0, &[1.0, 5.0, 3.0, 2.0]), 3.0);
        check_jacobian(logistic_value, logistic_jacobian, 2.2, [1.0, 5.0, 3.0, 2.0]);

        let mut out = [0.0; 4];
        assert!(logistic_jacobian(0.0, &[1.0, 5.0, 3.0, 2.0], &mut out));
        assert_eq!(out[3], 0.0);
        assert!(!logistic_jacobian(-1.0, &[1.0, 5.0, 3.0, 2.0], &mut out));
    }

    #[test]
    fn test_boltzmann_guess() {
        let x = Array1::linspace(-5.0, 5.0, 41);
        let y = x.mapv(|v| boltzmann_value(v, &[1.0, 3.0, 0.8, 0.6]));
        let data = FilteredData::from_arrays("step", x, y).unwrap();

        let guess = boltzmann_guess(&data);
        assert!((guess[0] - 1.0).abs() < 0.05);
        assert!((guess[1] - 3.0).abs() < 0.05);
        assert!((guess[2] - 0.8).abs() < 0.3);
        assert!(guess[3] > 0.0);
    }
}
