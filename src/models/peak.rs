//! Peak-shaped models: sums of N Gaussian or Lorentzian peaks on a shared offset.
//!
//! Gaussian peak with area `A`, center `xc` and width `w`:
//!
//! g(x) = A / (w * sqrt(pi/2)) * exp(-2 * ((x - xc) / w)^2)
//!
//! Lorentzian peak with area `A`, center `xc` and full width at half maximum `w`:
//!
//! l(x) = (2A / pi) * w / (4 * (x - xc)^2 + w^2)
//!
//! Parameters are laid out as `[A1, xc1, w1, ..., AN, xcN, wN, y0]`. A single
//! peak uses the plain names `[A, xc, w, y0]`.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use crate::data::FilteredData;
use crate::models::sorted_points;

/// Parameters per peak.
pub const PARAMS_PER_PEAK: usize = 3;

/// The basis function of a peak model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeakShape {
    Gaussian,
    Lorentzian,
}

impl PeakShape {
    pub fn label(&self) -> &'static str {
        match self {
            PeakShape::Gaussian => "Gauss",
            PeakShape::Lorentzian => "Lorentz",
        }
    }

    /// Peak maximum above the offset for a given area and width.
    pub fn height(&self, area: f64, width: f64) -> f64 {
        match self {
            PeakShape::Gaussian => area / (width * FRAC_PI_2.sqrt()),
            PeakShape::Lorentzian => 2.0 * area / (PI * width),
        }
    }

    /// Area of a peak with the given height and width.
    pub fn area(&self, height: f64, width: f64) -> f64 {
        match self {
            PeakShape::Gaussian => height * width * FRAC_PI_2.sqrt(),
            PeakShape::Lorentzian => height * PI * width / 2.0,
        }
    }

    /// Width parameter corresponding to a full width at half maximum.
    pub fn width_from_fwhm(&self, fwhm: f64) -> f64 {
        match self {
            PeakShape::Gaussian => fwhm / (2.0 * std::f64::consts::LN_2).sqrt(),
            PeakShape::Lorentzian => fwhm,
        }
    }

    fn term(&self, x: f64, area: f64, center: f64, width: f64) -> f64 {
        let d = x - center;
        match self {
            PeakShape::Gaussian => {
                let u = d / width;
                self.height(area, width) * (-2.0 * u * u).exp()
            }
            PeakShape::Lorentzian => 2.0 * area / PI * width / (4.0 * d * d + width * width),
        }
    }

    /// Writes `[df/dA, df/dxc, df/dw]` for one peak.
    fn term_jacobian(&self, x: f64, area: f64, center: f64, width: f64, out: &mut [f64]) {
        let d = x - center;
        match self {
            PeakShape::Gaussian => {
                let u = d / width;
                let g = (-2.0 * u * u).exp() / (width * FRAC_PI_2.sqrt());
                out[0] = g;
                out[1] = area * g * 4.0 * u / width;
                out[2] = area * g * (4.0 * u * u - 1.0) / width;
            }
            PeakShape::Lorentzian => {
                let denom = 4.0 * d * d + width * width;
                let c = 2.0 / PI;
                out[0] = c * width / denom;
                out[1] = c * area * width * 8.0 * d / (denom * denom);
                out[2] = c * area * (4.0 * d * d - width * width) / (denom * denom);
            }
        }
    }
}

impl fmt::Display for PeakShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fitted properties of one peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakInfo {
    /// 1-based peak number
    pub index: usize,
    pub center: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
}

/// A starting point for one peak, e.g. a point clicked on a plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSeed {
    pub center: f64,

    /// Observed y at the center, if known.
    pub height: Option<f64>,
}

impl PeakSeed {
    pub fn at(center: f64) -> Self {
        Self {
            center,
            height: None,
        }
    }

    pub fn with_height(center: f64, height: f64) -> Self {
        Self {
            center,
            height: Some(height),
        }
    }
}

pub(crate) fn names(peaks: usize) -> Vec<String> {
    if peaks == 1 {
        return ["A", "xc", "w", "y0"].iter().map(|s| s.to_string()).collect();
    }
    let mut names = Vec::with_capacity(PARAMS_PER_PEAK * peaks + 1);
    for k in 1..=peaks {
        names.push(format!("A{}", k));
        names.push(format!("xc{}", k));
        names.push(format!("w{}", k));
    }
    names.push("y0".to_string());
    names
}

pub(crate) fn formula(shape: PeakShape, peaks: usize) -> String {
    let term = match shape {
        PeakShape::Gaussian => "A/(w*sqrt(pi/2))*exp(-2*((x-xc)/w)^2)",
        PeakShape::Lorentzian => "(2*A/pi)*w/(4*(x-xc)^2+w^2)",
    };
    if peaks == 1 {
        format!("y = y0 + {}", term)
    } else {
        format!("y = y0 + sum of {} peaks {}", peaks, term)
    }
}

pub(crate) fn value(shape: PeakShape, x: f64, params: &[f64]) -> f64 {
    let peaks = params.len() / PARAMS_PER_PEAK;
    let y0 = params[PARAMS_PER_PEAK * peaks];
    params[..PARAMS_PER_PEAK * peaks]
        .chunks_exact(PARAMS_PER_PEAK)
        .fold(y0, |acc, p| acc + shape.term(x, p[0], p[1], p[2]))
}

pub(crate) fn jacobian(shape: PeakShape, x: f64, params: &[f64], out: &mut [f64]) -> bool {
    let peaks = params.len() / PARAMS_PER_PEAK;
    for k in 0..peaks {
        let p = &params[PARAMS_PER_PEAK * k..PARAMS_PER_PEAK * (k + 1)];
        if p[2] == 0.0 {
            return false;
        }
        shape.term_jacobian(x, p[0], p[1], p[2], &mut out[PARAMS_PER_PEAK * k..]);
    }
    out[PARAMS_PER_PEAK * peaks] = 1.0;
    true
}

/// Per-peak center, width, height and area from a fitted parameter vector.
pub fn breakdown(shape: PeakShape, params: &[f64]) -> Vec<PeakInfo> {
    let peaks = params.len() / PARAMS_PER_PEAK;
    params[..PARAMS_PER_PEAK * peaks]
        .chunks_exact(PARAMS_PER_PEAK)
        .enumerate()
        .map(|(k, p)| PeakInfo {
            index: k + 1,
            center: p[1],
            width: p[2],
            height: shape.height(p[0], p[2]),
            area: p[0],
        })
        .collect()
}

/// Initial parameters for `peaks` peaks located from the data's local maxima.
pub(crate) fn guess(shape: PeakShape, data: &FilteredData, peaks: usize) -> Vec<f64> {
    let points = sorted_points(data);
    let (x_min, x_max) = data.x_span().unwrap_or((0.0, 1.0));
    let span = x_max - x_min;
    let separation = span / (2.0 * peaks as f64);

    let mut maxima: Vec<(f64, f64)> = (0..points.len())
        .filter(|&i| {
            let left = i == 0 || points[i].1 >= points[i - 1].1;
            let right = i + 1 == points.len() || points[i].1 >= points[i + 1].1;
            left && right
        })
        .map(|i| points[i])
        .collect();
    maxima.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut centers: Vec<f64> = Vec::with_capacity(peaks);
    for (x, _) in maxima {
        if centers.len() == peaks {
            break;
        }
        if centers.iter().all(|c| (c - x).abs() > separation) {
            centers.push(x);
        }
    }
    let mut k = 1;
    while centers.len() < peaks {
        centers.push(x_min + span * k as f64 / (peaks + 1) as f64);
        k += 1;
    }
    centers.sort_by(f64::total_cmp);

    let seeds: Vec<PeakSeed> = centers.into_iter().map(PeakSeed::at).collect();
    seeded_guess(shape, data, &seeds)
}

/// Initial parameters with one peak at each seed, in seed order.
pub(crate) fn seeded_guess(shape: PeakShape, data: &FilteredData, seeds: &[PeakSeed]) -> Vec<f64> {
    let points = sorted_points(data);
    let peaks = seeds.len().max(1);
    let (x_min, x_max) = data.x_span().unwrap_or((0.0, 1.0));
    let span = if x_max > x_min { x_max - x_min } else { 1.0 };

    let y0 = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let y0 = if y0.is_finite() { y0 } else { 0.0 };
    let fallback_height = if y_max > y0 { 0.5 * (y_max - y0) } else { 1.0 };

    let mut params = Vec::with_capacity(PARAMS_PER_PEAK * seeds.len() + 1);
    for seed in seeds {
        let nearest = nearest_index(&points, seed.center);
        let observed = nearest.map(|i| points[i].1);
        let height = seed.height.or(observed).map_or(fallback_height, |y| y - y0);
        let height = if height > 0.0 { height } else { fallback_height };

        let max_fwhm = span / peaks as f64;
        let fwhm = nearest
            .and_then(|i| half_height_width(&points, i, y0, height))
            .filter(|&w| w > 0.0)
            .map_or(span / (4.0 * peaks as f64), |w| w.min(max_fwhm));
        let width = shape.width_from_fwhm(fwhm);

        params.push(shape.area(height, width));
        params.push(seed.center);
        params.push(width);
    }
    params.push(y0);
    params
}

fn nearest_index(points: &[(f64, f64)], x: f64) -> Option<usize> {
    (0..points.len()).min_by(|&a, &b| {
        (points[a].0 - x)
            .abs()
            .total_cmp(&(points[b].0 - x).abs())
    })
}

/// Distance between the half-height crossings around `idx`.
///
/// With a crossing on one side only, the width is twice that half-width.
fn half_height_width(points: &[(f64, f64)], idx: usize, y0: f64, height: f64) -> Option<f64> {
    let half = y0 + 0.5 * height;
    let center = points[idx].0;

    let left = points[..idx]
        .iter()
        .rev()
        .find(|p| p.1 <= half)
        .map(|p| center - p.0);
    let right = points[idx + 1..]
        .iter()
        .find(|p| p.1 <= half)
        .map(|p| p.0 - center);

    match (left, right) {
        (Some(l), Some(r)) => Some(l + r),
        (Some(l), None) => Some(2.0 * l),
        (None, Some(r)) => Some(2.0 * r),
        (None, None) => None,
    }
}
