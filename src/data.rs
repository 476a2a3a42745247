//! Read-only dataset views.
//!
//! The fitting engine never owns curve data. A [`Dataset`] borrows the x, y and
//! optional y-error columns from whatever table or matrix holds them, and
//! [`Dataset::filter`] produces the private copy of the in-range points that a
//! single fit works on.

use ndarray::Array1;

use crate::error::{InputError, Result};

/// A borrowed, read-only view of a curve: x/y pairs plus an optional y-error column.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    name: &'a str,
    x: &'a [f64],
    y: &'a [f64],
    errors: Option<&'a [f64]>,
}

impl<'a> Dataset<'a> {
    /// Create a view over the given columns.
    ///
    /// # Errors
    ///
    /// * `InputError::LengthMismatch` if `x` and `y` differ in length
    pub fn new(name: &'a str, x: &'a [f64], y: &'a [f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(InputError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            }
            .into());
        }

        Ok(Self {
            name,
            x,
            y,
            errors: None,
        })
    }

    /// Attach a y-error column, used by instrumental weighting.
    ///
    /// The column may be shorter than the data; the length is checked against the
    /// fitted range when weights are computed.
    pub fn with_errors(mut self, errors: &'a [f64]) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn x(&self) -> &[f64] {
        self.x
    }

    pub fn y(&self) -> &[f64] {
        self.y
    }

    pub fn errors(&self) -> Option<&[f64]> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Select the points whose x lies inside the inclusive range.
    ///
    /// `None` keeps every point. Points with a non-finite x or y are skipped.
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidRange` if `from >= to` or either bound is NaN
    pub fn filter(&self, range: Option<(f64, f64)>) -> Result<FilteredData> {
        if let Some((from, to)) = range {
            // NaN bounds fail this comparison as well.
            if !(from < to) {
                return Err(InputError::InvalidRange { from, to }.into());
            }
        }

        let in_range = |x: f64| match range {
            Some((from, to)) => x >= from && x <= to,
            None => true,
        };

        let mut rows = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (row, (&xi, &yi)) in self.x.iter().zip(self.y.iter()).enumerate() {
            if xi.is_finite() && yi.is_finite() && in_range(xi) {
                rows.push(row);
                x.push(xi);
                y.push(yi);
            }
        }

        Ok(FilteredData {
            name: self.name.to_string(),
            x: Array1::from_vec(x),
            y: Array1::from_vec(y),
            rows,
            range,
        })
    }
}

/// The in-range points of a dataset, copied out for one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredData {
    name: String,
    x: Array1<f64>,
    y: Array1<f64>,
    rows: Vec<usize>,
    range: Option<(f64, f64)>,
}

impl FilteredData {
    /// Build filtered data directly from owned columns, with every row in range.
    ///
    /// # Errors
    ///
    /// * `InputError::LengthMismatch` if `x` and `y` differ in length
    pub fn from_arrays(name: &str, x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(InputError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            }
            .into());
        }
        let rows = (0..x.len()).collect();
        Ok(Self {
            name: name.to_string(),
            x,
            y,
            rows,
            range: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Row indices of the selected points in the source dataset.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// The requested x-range, or `None` for the full curve.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Smallest and largest x among the selected points.
    pub fn x_span(&self) -> Option<(f64, f64)> {
        if self.x.is_empty() {
            return None;
        }
        let min = self.x.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Number of source rows an external column must cover to align with this range.
    pub fn required_rows(&self) -> usize {
        self.rows.iter().max().map_or(0, |&last| last + 1)
    }

    /// Index of the point with the smallest x.
    pub(crate) fn argmin_x(&self) -> Option<usize> {
        argext(&self.x, |a, b| a < b)
    }

    /// Index of the point with the largest x.
    pub(crate) fn argmax_x(&self) -> Option<usize> {
        argext(&self.x, |a, b| a > b)
    }
}

fn argext(values: &Array1<f64>, better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some(b) if !better(v, values[b]) => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_inclusive_range() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 3.0, 5.0, 7.0, 9.0];
        let data = Dataset::new("curve", &x, &y).unwrap();

        let filtered = data.filter(Some((1.0, 3.0))).unwrap();
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.rows(), &[1, 2, 3]);
        assert_eq!(filtered.required_rows(), 4);
        assert_eq!(filtered.x_span(), Some((1.0, 3.0)));
    }

    #[test]
    fn test_filter_rejects_reversed_range() {
        let x = [0.0, 1.0];
        let y = [0.0, 1.0];
        let data = Dataset::new("curve", &x, &y).unwrap();

        let err = data.filter(Some((3.0, 1.0))).unwrap_err();
        assert_eq!(
            err.as_input(),
            Some(&InputError::InvalidRange { from: 3.0, to: 1.0 })
        );
        assert!(data.filter(Some((1.0, 1.0))).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0];
        assert!(Dataset::new("curve", &x, &y).is_err());
    }

    #[test]
    fn test_filter_skips_non_finite_points() {
        let x = [0.0, 1.0, f64::NAN, 3.0];
        let y = [0.0, f64::INFINITY, 2.0, 3.0];
        let data = Dataset::new("curve", &x, &y).unwrap();

        let filtered = data.filter(None).unwrap();
        assert_eq!(filtered.rows(), &[0, 3]);
        assert_eq!(filtered.argmax_x(), Some(1));
        assert_eq!(filtered.argmin_x(), Some(0));
    }
}
