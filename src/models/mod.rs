//! Built-in and user-defined model implementations.
//!
//! This module provides the fixed catalog of built-in models (linear,
//! polynomial, exponential decay and growth, logistic, Boltzmann, Gaussian and
//! Lorentzian peak sums) and the expression-backed [`UserFunction`].

use serde::{Deserialize, Serialize};

use crate::data::FilteredData;
use crate::error::ModelError;
use crate::model::{JacobianSource, ModelFunction};

pub mod exponential;
pub mod peak;
pub mod polynomial;
pub mod step;
pub(crate) mod user;

pub use peak::{breakdown, PeakInfo, PeakSeed, PeakShape};
pub use user::UserFunction;

/// The built-in models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinModel {
    /// `y = slope*x + intercept`
    Linear,

    /// Polynomial of order 1 to 9.
    Polynomial { order: usize },

    /// Sum of 1 to 3 decaying exponentials on an offset.
    ExpDecay { terms: usize },

    /// Single growing exponential on an offset.
    ExpGrowth,

    /// Dose-response curve between two plateaus.
    Logistic,

    /// Sigmoidal step between two plateaus.
    Boltzmann,

    /// Sum of `peaks` identical peak shapes on a shared offset.
    PeakSum { shape: PeakShape, peaks: usize },
}

/// Create a polynomial model; the order is clamped to `1..=9`.
pub fn polynomial(order: usize) -> BuiltinModel {
    BuiltinModel::Polynomial {
        order: polynomial::clamp_order(order),
    }
}

/// Create an exponential decay with `terms` components, clamped to `1..=3`.
pub fn exp_decay(terms: usize) -> BuiltinModel {
    BuiltinModel::ExpDecay {
        terms: exponential::clamp_terms(terms),
    }
}

/// Create a sum of `peaks` Gaussians; at least one peak.
pub fn gaussian(peaks: usize) -> BuiltinModel {
    BuiltinModel::PeakSum {
        shape: PeakShape::Gaussian,
        peaks: peaks.max(1),
    }
}

/// Create a sum of `peaks` Lorentzians; at least one peak.
pub fn lorentzian(peaks: usize) -> BuiltinModel {
    BuiltinModel::PeakSum {
        shape: PeakShape::Lorentzian,
        peaks: peaks.max(1),
    }
}

impl BuiltinModel {
    /// Look up a built-in model by name, ignoring case.
    ///
    /// Recognized names: `linear`, `poly<N>`, `expdecay`, `expdecay<N>`,
    /// `expgrowth`, `logistic`, `boltzmann`, `gauss`/`gaussian` and
    /// `lorentz`/`lorentzian`, the peak names optionally followed by a peak count.
    ///
    /// # Errors
    ///
    /// * `ModelError::UnknownModel` if the name is not a built-in
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        let lower = name.trim().to_ascii_lowercase();
        let split = lower.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (stem, digits) = lower.split_at(split);
        let unknown = || ModelError::UnknownModel(name.to_string());
        let count = if digits.is_empty() {
            None
        } else {
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err(unknown()),
            }
        };

        let model = match (stem, count) {
            ("linear", None) => BuiltinModel::Linear,
            ("poly" | "polynomial", Some(order)) => polynomial(order),
            ("expdecay", None) => exp_decay(1),
            ("expdecay", Some(n)) if (1..=exponential::MAX_TERMS).contains(&n) => exp_decay(n),
            ("expgrowth", None | Some(1)) => BuiltinModel::ExpGrowth,
            ("logistic", None) => BuiltinModel::Logistic,
            ("boltzmann", None) => BuiltinModel::Boltzmann,
            ("gauss" | "gaussian", n) => gaussian(n.unwrap_or(1)),
            ("lorentz" | "lorentzian", n) => lorentzian(n.unwrap_or(1)),
            _ => return Err(unknown()),
        };

        Ok(model)
    }

    /// Whether `name` would resolve to a built-in model.
    pub fn is_builtin_name(name: &str) -> bool {
        Self::from_name(name).is_ok()
    }

    /// Check the size fields of a directly constructed or deserialized model.
    ///
    /// The constructor functions and [`BuiltinModel::from_name`] always produce
    /// valid models.
    ///
    /// # Errors
    ///
    /// * `ModelError::InvalidBuiltin` for a polynomial order outside `1..=9`, an
    ///   exponential decay outside `1..=3` terms or a peak sum without peaks
    pub fn validate(&self) -> Result<(), ModelError> {
        let message = match *self {
            BuiltinModel::Polynomial { order }
                if !(polynomial::MIN_ORDER..=polynomial::MAX_ORDER).contains(&order) =>
            {
                format!(
                    "order {} is outside {}..={}",
                    order,
                    polynomial::MIN_ORDER,
                    polynomial::MAX_ORDER
                )
            }
            BuiltinModel::ExpDecay { terms } if !(1..=exponential::MAX_TERMS).contains(&terms) => {
                format!("{} terms is outside 1..={}", terms, exponential::MAX_TERMS)
            }
            BuiltinModel::PeakSum { peaks: 0, .. } => "a peak sum needs at least one peak".to_string(),
            _ => return Ok(()),
        };
        Err(ModelError::InvalidBuiltin {
            model: format!("{:?}", self),
            message,
        })
    }

    /// Representative built-ins, one per family, for listings.
    pub fn catalog() -> Vec<BuiltinModel> {
        vec![
            BuiltinModel::Linear,
            polynomial(2),
            exp_decay(1),
            exp_decay(2),
            exp_decay(3),
            BuiltinModel::ExpGrowth,
            BuiltinModel::Logistic,
            BuiltinModel::Boltzmann,
            gaussian(1),
            lorentzian(1),
        ]
    }
}

impl ModelFunction for BuiltinModel {
    fn name(&self) -> String {
        match *self {
            BuiltinModel::Linear => "Linear".to_string(),
            BuiltinModel::Polynomial { order } => format!("Poly{}", order),
            BuiltinModel::ExpDecay { terms } => format!("ExpDecay{}", terms),
            BuiltinModel::ExpGrowth => "ExpGrowth".to_string(),
            BuiltinModel::Logistic => "Logistic".to_string(),
            BuiltinModel::Boltzmann => "Boltzmann".to_string(),
            BuiltinModel::PeakSum { shape, peaks: 1 } => shape.label().to_string(),
            BuiltinModel::PeakSum { shape, peaks } => format!("{}{}", shape.label(), peaks),
        }
    }

    fn formula(&self) -> String {
        match *self {
            BuiltinModel::Linear => "y = slope*x + intercept".to_string(),
            BuiltinModel::Polynomial { order } => polynomial::polynomial_formula(order),
            BuiltinModel::ExpDecay { terms } => exponential::decay_formula(terms),
            BuiltinModel::ExpGrowth => exponential::growth_formula(),
            BuiltinModel::Logistic => "y = A2 + (A1-A2)/(1 + (x/x0)^p)".to_string(),
            BuiltinModel::Boltzmann => "y = A2 + (A1-A2)/(1 + exp((x-x0)/dx))".to_string(),
            BuiltinModel::PeakSum { shape, peaks } => peak::formula(shape, peaks),
        }
    }

    fn parameter_names(&self) -> Vec<String> {
        match *self {
            BuiltinModel::Linear => vec!["slope".to_string(), "intercept".to_string()],
            BuiltinModel::Polynomial { order } => polynomial::polynomial_names(order),
            BuiltinModel::ExpDecay { terms } => exponential::names(terms),
            BuiltinModel::ExpGrowth => exponential::names(1),
            BuiltinModel::Logistic => step::logistic_names(),
            BuiltinModel::Boltzmann => step::boltzmann_names(),
            BuiltinModel::PeakSum { peaks, .. } => peak::names(peaks),
        }
    }

    fn parameter_count(&self) -> usize {
        match *self {
            BuiltinModel::Linear => 2,
            BuiltinModel::Polynomial { order } => order + 1,
            BuiltinModel::ExpDecay { terms } => 2 * terms + 1,
            BuiltinModel::ExpGrowth => 3,
            BuiltinModel::Logistic | BuiltinModel::Boltzmann => 4,
            BuiltinModel::PeakSum { peaks, .. } => peak::PARAMS_PER_PEAK * peaks + 1,
        }
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match *self {
            BuiltinModel::Linear => params[0] * x + params[1],
            BuiltinModel::Polynomial { .. } => polynomial::polynomial_value(x, params),
            BuiltinModel::ExpDecay { .. } => exponential::value(x, params, -1.0),
            BuiltinModel::ExpGrowth => exponential::value(x, params, 1.0),
            BuiltinModel::Logistic => step::logistic_value(x, params),
            BuiltinModel::Boltzmann => step::boltzmann_value(x, params),
            BuiltinModel::PeakSum { shape, .. } => peak::value(shape, x, params),
        }
    }

    fn jacobian(&self, x: f64, params: &[f64], out: &mut [f64]) -> bool {
        match *self {
            BuiltinModel::Linear => {
                out[0] = x;
                out[1] = 1.0;
                true
            }
            BuiltinModel::Polynomial { .. } => {
                polynomial::polynomial_jacobian(x, out);
                true
            }
            BuiltinModel::ExpDecay { .. } => exponential::jacobian(x, params, -1.0, out),
            BuiltinModel::ExpGrowth => exponential::jacobian(x, params, 1.0, out),
            BuiltinModel::Logistic => step::logistic_jacobian(x, params, out),
            BuiltinModel::Boltzmann => step::boltzmann_jacobian(x, params, out),
            BuiltinModel::PeakSum { shape, .. } => peak::jacobian(shape, x, params, out),
        }
    }

    fn jacobian_source(&self) -> JacobianSource {
        JacobianSource::Analytic
    }

    fn initial_guess(&self, data: &FilteredData) -> Vec<f64> {
        match *self {
            BuiltinModel::Linear => polynomial::linear_guess(data),
            BuiltinModel::Polynomial { order } => polynomial::polynomial_guess(data, order),
            BuiltinModel::ExpDecay { terms } => exponential::decay_guess(data, terms),
            BuiltinModel::ExpGrowth => exponential::growth_guess(data),
            BuiltinModel::Logistic => step::logistic_guess(data),
            BuiltinModel::Boltzmann => step::boltzmann_guess(data),
            BuiltinModel::PeakSum { shape, peaks } => peak::guess(shape, data, peaks),
        }
    }

    fn min_points(&self) -> usize {
        match self {
            // One more point than parameters keeps the time constants identifiable.
            BuiltinModel::ExpDecay { .. } | BuiltinModel::ExpGrowth => self.parameter_count() + 1,
            _ => self.parameter_count(),
        }
    }

    fn peak_layout(&self) -> Option<(PeakShape, usize)> {
        match *self {
            BuiltinModel::PeakSum { shape, peaks } => Some((shape, peaks)),
            _ => None,
        }
    }
}

/// The data points ordered by x.
pub(crate) fn sorted_points(data: &FilteredData) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = data
        .x()
        .iter()
        .copied()
        .zip(data.y().iter().copied())
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}
