//! Weighting strategies.
//!
//! A weight `w_i` is the inverse variance of point `i`. The fit minimizes
//! `chi² = Σ w_i (y_i - f(x_i))²`, i.e. each residual is scaled by `sqrt(w_i)`.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::{Dataset, FilteredData};
use crate::error::{InputError, Result};

/// How per-point weights are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Weighting {
    /// Every point has weight 1.
    #[default]
    None,

    /// `w_i = 1 / σ_i²`, from the dataset's y-error column.
    Instrumental,

    /// `w_i = 1 / |y_i|`: Poisson statistics, the signal is its own variance.
    Statistical,

    /// Weights taken directly from an external column, aligned with source rows.
    Arbitrary { weights: Vec<f64> },
}

impl Weighting {
    /// Human-readable name used in fit reports.
    pub fn label(&self) -> &'static str {
        match self {
            Weighting::None => "No weighting",
            Weighting::Instrumental => "Instrumental",
            Weighting::Statistical => "Statistical",
            Weighting::Arbitrary { .. } => "Arbitrary dataset",
        }
    }

    /// Compute the weight vector for the in-range points of `dataset`.
    ///
    /// The returned vector is aligned 1:1 with `data`.
    ///
    /// # Errors
    ///
    /// * `InputError::MissingErrorColumn` for instrumental weighting without errors
    /// * `InputError::RowCountMismatch` if an external column is shorter than the range
    /// * `InputError::InvalidWeight` if a weight comes out negative or non-finite
    pub fn weights(&self, dataset: &Dataset<'_>, data: &FilteredData) -> Result<Array1<f64>> {
        let weights = match self {
            Weighting::None => Array1::ones(data.len()),

            Weighting::Instrumental => {
                let errors = dataset
                    .errors()
                    .ok_or_else(|| InputError::MissingErrorColumn {
                        dataset: dataset.name().to_string(),
                    })?;
                let column = aligned(errors, data)?;
                column.mapv(|sigma| 1.0 / (sigma * sigma))
            }

            Weighting::Statistical => data.y().mapv(|y| {
                let variance = y.abs();
                if variance > 0.0 {
                    1.0 / variance
                } else {
                    1.0
                }
            }),

            Weighting::Arbitrary { weights } => aligned(weights, data)?,
        };

        for (i, &w) in weights.iter().enumerate() {
            if !w.is_finite() || w < 0.0 {
                return Err(InputError::InvalidWeight {
                    row: data.rows()[i],
                    value: w,
                }
                .into());
            }
        }

        Ok(weights)
    }
}

/// Pick the entries of an external column that belong to the filtered rows.
fn aligned(column: &[f64], data: &FilteredData) -> Result<Array1<f64>> {
    let required = data.required_rows();
    if column.len() < required {
        return Err(InputError::RowCountMismatch {
            required,
            available: column.len(),
        }
        .into());
    }
    Ok(data.rows().iter().map(|&row| column[row]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_instrumental_weights() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 2.0, 3.0];
        let err = [0.5, 1.0, 2.0];
        let data = Dataset::new("d", &x, &y).unwrap().with_errors(&err);
        let filtered = data.filter(None).unwrap();

        let w = Weighting::Instrumental.weights(&data, &filtered).unwrap();
        assert_relative_eq!(w[0], 4.0);
        assert_relative_eq!(w[1], 1.0);
        assert_relative_eq!(w[2], 0.25);
    }

    #[test]
    fn test_statistical_weights() {
        let x = [0.0, 1.0, 2.0];
        let y = [4.0, 0.0, -2.0];
        let data = Dataset::new("d", &x, &y).unwrap();
        let filtered = data.filter(None).unwrap();

        let w = Weighting::Statistical.weights(&data, &filtered).unwrap();
        assert_relative_eq!(w[0], 0.25);
        assert_relative_eq!(w[1], 1.0);
        assert_relative_eq!(w[2], 0.5);
    }

    #[test]
    fn test_arbitrary_weights_follow_source_rows() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0, 1.0, 2.0, 3.0];
        let data = Dataset::new("d", &x, &y).unwrap();
        let filtered = data.filter(Some((1.5, 3.0))).unwrap();

        let weighting = Weighting::Arbitrary {
            weights: vec![1.0, 2.0, 3.0, 4.0],
        };
        let w = weighting.weights(&data, &filtered).unwrap();
        assert_eq!(w.to_vec(), vec![3.0, 4.0]);

        let short = Weighting::Arbitrary {
            weights: vec![1.0, 2.0, 3.0],
        };
        let err = short.weights(&data, &filtered).unwrap_err();
        assert_eq!(
            err.as_input(),
            Some(&InputError::RowCountMismatch {
                required: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_zero_error_is_invalid() {
        let x = [0.0, 1.0];
        let y = [1.0, 2.0];
        let err = [1.0, 0.0];
        let data = Dataset::new("d", &x, &y).unwrap().with_errors(&err);
        let filtered = data.filter(None).unwrap();

        let result = Weighting::Instrumental.weights(&data, &filtered);
        assert!(matches!(
            result.unwrap_err().as_input(),
            Some(InputError::InvalidWeight { row: 1, .. })
        ));
    }
}
