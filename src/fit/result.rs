//! The outcome of one fit.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{FitModel, ModelFunction};
use crate::models::PeakInfo;
use crate::optimizer::{Algorithm, OptimizerState};

/// How the optimizer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    MaxIterationsReached,
    /// The fit broke down, e.g. the model produced NaN or the step was singular.
    Failed,
}

impl FitStatus {
    pub fn description(&self) -> &'static str {
        match self {
            FitStatus::Converged => "converged",
            FitStatus::MaxIterationsReached => "maximum iterations reached",
            FitStatus::Failed => "failed",
        }
    }
}

impl From<OptimizerState> for FitStatus {
    fn from(state: OptimizerState) -> Self {
        match state {
            OptimizerState::Converged => FitStatus::Converged,
            OptimizerState::MaxIterationsReached => FitStatus::MaxIterationsReached,
            OptimizerState::Initialized | OptimizerState::Iterating | OptimizerState::Failed => {
                FitStatus::Failed
            }
        }
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A fitted parameter with its uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub std_error: f64,

    /// Held at its initial value during the fit
    pub fixed: bool,
}

/// A generated `(x, y)` curve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FitCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl FitCurve {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Result of fitting one model to one dataset.
///
/// Immutable once returned. Statistics are computed over the filtered,
/// weighted points.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Name of the fitted dataset
    pub dataset: String,

    pub algorithm: Algorithm,

    /// Label of the weighting method
    pub weighting: String,

    pub tolerance: f64,

    /// Configured x sub-range, `None` for the full curve
    pub range: Option<(f64, f64)>,

    /// Number of points in the fit
    pub points: usize,

    pub parameters: Vec<ParameterEstimate>,

    /// Covariance over all parameters; fixed ones have zero rows and columns
    pub covariance: Array2<f64>,

    pub correlation: Array2<f64>,

    /// Sum of squared weighted residuals
    pub chi_square: f64,

    /// `chi_square / dof`, NaN when no degrees of freedom remain
    pub reduced_chi_square: f64,

    /// Points minus varying parameters
    pub dof: usize,

    pub r_squared: f64,

    pub adjusted_r_squared: f64,

    /// `sqrt(chi_square / points)`
    pub rmse: f64,

    /// Unweighted residuals `y - f(x)` at the fitted points
    pub residuals: Array1<f64>,

    pub curve: FitCurve,

    pub status: FitStatus,

    /// Why the optimizer stopped
    pub message: String,

    pub iterations: usize,

    pub func_evals: usize,

    /// Per-peak breakdown for peak models
    pub peaks: Option<Vec<PeakInfo>>,

    pub(crate) model: Arc<FitModel>,
}

impl FitResult {
    pub fn model(&self) -> &FitModel {
        &self.model
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    pub fn is_converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterEstimate> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.value)
    }

    pub fn std_error(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.std_error)
    }

    pub fn values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Evaluate the fitted model at any x.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.model.evaluate(x, &self.values())
    }

    /// Serialize the result, without the model handle, as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        let summary = FitSummary {
            dataset: &self.dataset,
            model: self.model.name(),
            formula: self.model.formula(),
            algorithm: self.algorithm,
            weighting: &self.weighting,
            tolerance: self.tolerance,
            range: self.range,
            points: self.points,
            parameters: &self.parameters,
            covariance: rows(&self.covariance),
            chi_square: self.chi_square,
            reduced_chi_square: self.reduced_chi_square,
            dof: self.dof,
            r_squared: self.r_squared,
            adjusted_r_squared: self.adjusted_r_squared,
            rmse: self.rmse,
            status: self.status,
            message: &self.message,
            iterations: self.iterations,
            peaks: self.peaks.as_deref(),
            curve: &self.curve,
        };
        Ok(serde_json::to_string_pretty(&summary)?)
    }
}

/// Results compare equal when every reported number is bit-identical, so two
/// failed fits carrying the same NaN statistics are equal; the model handle is
/// compared by name.
impl PartialEq for FitResult {
    fn eq(&self, other: &Self) -> bool {
        let same_parameters = self.parameters.len() == other.parameters.len()
            && self.parameters.iter().zip(&other.parameters).all(|(a, b)| {
                a.name == b.name
                    && a.fixed == b.fixed
                    && a.value.to_bits() == b.value.to_bits()
                    && a.std_error.to_bits() == b.std_error.to_bits()
            });
        let same_peaks = match (&self.peaks, &other.peaks) {
            (Some(a), Some(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(p, q)| {
                        let left = [p.center, p.width, p.height, p.area];
                        let right = [q.center, q.width, q.height, q.area];
                        p.index == q.index && same_bits(left.iter(), right.iter())
                    })
            }
            (None, None) => true,
            _ => false,
        };

        self.dataset == other.dataset
            && self.model.name() == other.model.name()
            && self.algorithm == other.algorithm
            && self.weighting == other.weighting
            && self.tolerance.to_bits() == other.tolerance.to_bits()
            && self.range == other.range
            && self.points == other.points
            && same_parameters
            && self.covariance.shape() == other.covariance.shape()
            && same_bits(self.covariance.iter(), other.covariance.iter())
            && self.correlation.shape() == other.correlation.shape()
            && same_bits(self.correlation.iter(), other.correlation.iter())
            && self.chi_square.to_bits() == other.chi_square.to_bits()
            && self.reduced_chi_square.to_bits() == other.reduced_chi_square.to_bits()
            && self.dof == other.dof
            && self.r_squared.to_bits() == other.r_squared.to_bits()
            && self.adjusted_r_squared.to_bits() == other.adjusted_r_squared.to_bits()
            && self.rmse.to_bits() == other.rmse.to_bits()
            && same_bits(self.residuals.iter(), other.residuals.iter())
            && same_bits(self.curve.x.iter(), other.curve.x.iter())
            && same_bits(self.curve.y.iter(), other.curve.y.iter())
            && self.status == other.status
            && self.message == other.message
            && self.iterations == other.iterations
            && self.func_evals == other.func_evals
            && same_peaks
    }
}

fn same_bits<'a>(
    a: impl ExactSizeIterator<Item = &'a f64>,
    b: impl ExactSizeIterator<Item = &'a f64>,
) -> bool {
    a.len() == b.len() && a.zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

fn rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FitSummary<'a> {
    dataset: &'a str,
    model: String,
    formula: String,
    algorithm: Algorithm,
    weighting: &'a str,
    tolerance: f64,
    range: Option<(f64, f64)>,
    points: usize,
    parameters: &'a [ParameterEstimate],
    covariance: Vec<Vec<f64>>,
    chi_square: f64,
    reduced_chi_square: f64,
    dof: usize,
    r_squared: f64,
    adjusted_r_squared: f64,
    rmse: f64,
    status: FitStatus,
    message: &'a str,
    iterations: usize,
    peaks: Option<&'a [PeakInfo]>,
    curve: &'a FitCurve,
}
