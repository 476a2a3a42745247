//! The model capability trait and the closed set of model kinds.
//!
//! Every fit model, whether built in, parsed from a user expression or loaded from
//! a plugin, is driven through [`ModelFunction`]. The optimizers never see the
//! concrete kind: they receive residuals and a Jacobian from
//! [`ResidualProblem`](crate::problem::ResidualProblem), which asks the model for
//! analytic derivatives and falls back to finite differences when it has none.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::FilteredData;
use crate::error::ModelError;
use crate::models::{BuiltinModel, PeakShape, UserFunction};
use crate::plugin::PluginModel;

/// Where a model's derivatives come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JacobianSource {
    /// The model computes `df/dp_j` itself.
    Analytic,

    /// Derivatives are approximated by finite differences of `evaluate`.
    Numeric,

    /// The model offers no derivatives at all; only gradient-free algorithms apply.
    Unavailable,
}

/// Origin of a model definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelCategory {
    BuiltIn,
    UserDefined,
    Plugin,
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelCategory::BuiltIn => "built-in",
            ModelCategory::UserDefined => "user-defined",
            ModelCategory::Plugin => "plugin",
        };
        f.write_str(label)
    }
}

/// A parametric function `y = f(x, p)` that can be fitted to data.
///
/// Implementations are immutable once constructed and shared between threads,
/// so one definition can serve many independent fits.
pub trait ModelFunction: Send + Sync {
    /// Display name, e.g. `"Gauss"` or the name a user function was registered under.
    fn name(&self) -> String;

    /// Human-readable formula for reports.
    fn formula(&self) -> String;

    /// Ordered parameter names. The order fixes the layout of every parameter vector.
    fn parameter_names(&self) -> Vec<String>;

    fn parameter_count(&self) -> usize {
        self.parameter_names().len()
    }

    /// Evaluate the model at `x`.
    ///
    /// Returns NaN when the model is undefined at this point.
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Write `df/dp_j` at `x` into `out`.
    ///
    /// Returns `false` if the model cannot provide analytic derivatives here; the
    /// caller then differentiates numerically.
    fn jacobian(&self, _x: f64, _params: &[f64], _out: &mut [f64]) -> bool {
        false
    }

    fn jacobian_source(&self) -> JacobianSource {
        JacobianSource::Numeric
    }

    /// Starting parameter values estimated from the data to be fitted.
    fn initial_guess(&self, data: &FilteredData) -> Vec<f64>;

    /// Smallest number of in-range points this model can be fitted to.
    fn min_points(&self) -> usize {
        self.parameter_count()
    }

    /// Shape and number of peaks if the model is a peak sum.
    fn peak_layout(&self) -> Option<(PeakShape, usize)> {
        None
    }

    /// Evaluate the model at every x.
    fn evaluate_all(&self, x: &Array1<f64>, params: &[f64]) -> Array1<f64> {
        x.mapv(|v| self.evaluate(v, params))
    }
}

/// A model of any kind, dispatched through [`ModelFunction`].
#[derive(Debug, Clone)]
pub enum FitModel {
    BuiltIn(BuiltinModel),
    UserDefined(UserFunction),
    Plugin(PluginModel),
}

impl FitModel {
    pub fn category(&self) -> ModelCategory {
        match self {
            FitModel::BuiltIn(_) => ModelCategory::BuiltIn,
            FitModel::UserDefined(_) => ModelCategory::UserDefined,
            FitModel::Plugin(_) => ModelCategory::Plugin,
        }
    }

    /// Reject built-in models whose size fields are out of range.
    ///
    /// # Errors
    ///
    /// * `ModelError::InvalidBuiltin` from [`BuiltinModel::validate`]
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            FitModel::BuiltIn(model) => model.validate(),
            FitModel::UserDefined(_) | FitModel::Plugin(_) => Ok(()),
        }
    }

    fn inner(&self) -> &dyn ModelFunction {
        match self {
            FitModel::BuiltIn(model) => model,
            FitModel::UserDefined(model) => model,
            FitModel::Plugin(model) => model,
        }
    }
}

impl From<BuiltinModel> for FitModel {
    fn from(model: BuiltinModel) -> Self {
        FitModel::BuiltIn(model)
    }
}

impl From<UserFunction> for FitModel {
    fn from(model: UserFunction) -> Self {
        FitModel::UserDefined(model)
    }
}

impl From<PluginModel> for FitModel {
    fn from(model: PluginModel) -> Self {
        FitModel::Plugin(model)
    }
}

impl ModelFunction for FitModel {
    fn name(&self) -> String {
        self.inner().name()
    }

    fn formula(&self) -> String {
        self.inner().formula()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.inner().parameter_names()
    }

    fn parameter_count(&self) -> usize {
        self.inner().parameter_count()
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.inner().evaluate(x, params)
    }

    fn jacobian(&self, x: f64, params: &[f64], out: &mut [f64]) -> bool {
        self.inner().jacobian(x, params, out)
    }

    fn jacobian_source(&self) -> JacobianSource {
        self.inner().jacobian_source()
    }

    fn initial_guess(&self, data: &FilteredData) -> Vec<f64> {
        self.inner().initial_guess(data)
    }

    fn min_points(&self) -> usize {
        self.inner().min_points()
    }

    fn peak_layout(&self) -> Option<(PeakShape, usize)> {
        self.inner().peak_layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_to_builtin() {
        let model = FitModel::from(BuiltinModel::Linear);
        assert_eq!(model.category(), ModelCategory::BuiltIn);
        assert_eq!(model.parameter_names(), vec!["slope", "intercept"]);
        assert_eq!(model.evaluate(2.0, &[3.0, 1.0]), 7.0);
        assert_eq!(model.jacobian_source(), JacobianSource::Analytic);
        assert_eq!(model.min_points(), 2);
        assert!(model.peak_layout().is_none());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ModelCategory::UserDefined.to_string(), "user-defined");
    }
}
