//! Fit configuration.
//!
//! A [`FitConfig`] serializes to JSON with camelCase keys, and every key is
//! optional:
//!
//! ```json
//! {
//!   "algorithm": "ScaledLM",
//!   "tolerance": 1e-4,
//!   "maxIterations": 1000,
//!   "weighting": "Statistical",
//!   "xRange": [0.5, 9.5],
//!   "outputPoints": "sameAsSource",
//!   "significantDigits": 6,
//!   "scaleErrorsBySqrtChiSquareOverDoF": true,
//!   "parameters": { "y0": { "value": 0.0, "fixed": true } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{InputError, Result};
use crate::optimizer::Algorithm;
use crate::weighting::Weighting;

/// Hard upper bound on `maxIterations`.
pub const MAX_ITERATIONS_CAP: usize = 10_000;

/// How many points the generated fit curve has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OutputPointsRepr", into = "OutputPointsRepr")]
pub enum OutputPoints {
    /// Evenly spaced points over the fitted x-span.
    Count(usize),

    /// The x values of the fitted source points.
    SameAsSource,
}

impl Default for OutputPoints {
    fn default() -> Self {
        OutputPoints::Count(100)
    }
}

/// JSON form of [`OutputPoints`]: a number or the string `"sameAsSource"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum OutputPointsRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<OutputPointsRepr> for OutputPoints {
    type Error = String;

    fn try_from(repr: OutputPointsRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            OutputPointsRepr::Count(n) => Ok(OutputPoints::Count(n)),
            OutputPointsRepr::Keyword(k) if k == "sameAsSource" => Ok(OutputPoints::SameAsSource),
            OutputPointsRepr::Keyword(k) => Err(format!(
                "expected a point count or \"sameAsSource\", got \"{}\"",
                k
            )),
        }
    }
}

impl From<OutputPoints> for OutputPointsRepr {
    fn from(points: OutputPoints) -> Self {
        match points {
            OutputPoints::Count(n) => OutputPointsRepr::Count(n),
            OutputPoints::SameAsSource => OutputPointsRepr::Keyword("sameAsSource".to_string()),
        }
    }
}

/// Where parameter tables go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableMode {
    /// No table output.
    None,

    /// A new table for every fit.
    #[default]
    PerFit,

    /// One table accumulating a row per fit.
    Shared,
}

/// Overrides for one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterHint {
    /// Initial value replacing the model's guess
    pub value: Option<f64>,

    /// Keep the parameter at its initial value
    pub fixed: bool,

    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParameterHint {
    pub fn initial(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            value: Some(value),
            fixed: true,
            ..Self::default()
        }
    }

    pub fn bounded(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Bounds with missing sides open.
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.min.unwrap_or(f64::NEG_INFINITY),
            self.max.unwrap_or(f64::INFINITY),
        )
    }
}

/// Everything that controls one fit besides the data and the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitConfig {
    pub algorithm: Algorithm,

    /// Convergence threshold, strictly between 0 and 1
    pub tolerance: f64,

    /// Iteration cap, 1 to [`MAX_ITERATIONS_CAP`]
    pub max_iterations: usize,

    pub weighting: Weighting,

    /// Inclusive x sub-range; `None` fits the whole curve
    pub x_range: Option<(f64, f64)>,

    pub output_points: OutputPoints,

    /// Significant digits in reports
    pub significant_digits: usize,

    /// Scale the covariance by the reduced chi-square
    #[serde(rename = "scaleErrorsBySqrtChiSquareOverDoF")]
    pub scale_errors: bool,

    /// Send the text report to the log sink
    pub write_to_log: bool,

    /// Send a parameter summary to the curve sink for display on the plot
    pub paste_to_plot: bool,

    /// Send the generated curve to the curve sink
    pub plot_curve: bool,

    pub parameter_table: TableMode,

    /// Also send the covariance matrix to the table sink
    pub covariance_matrix: bool,

    /// Per-parameter overrides, by name
    pub parameters: BTreeMap<String, ParameterHint>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            tolerance: 1e-4,
            max_iterations: 1000,
            weighting: Weighting::None,
            x_range: None,
            output_points: OutputPoints::default(),
            significant_digits: 6,
            scale_errors: true,
            write_to_log: true,
            paste_to_plot: false,
            plot_curve: true,
            parameter_table: TableMode::default(),
            covariance_matrix: false,
            parameters: BTreeMap::new(),
        }
    }
}

impl FitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_range(mut self, from: f64, to: f64) -> Self {
        self.x_range = Some((from, to));
        self
    }

    pub fn with_output_points(mut self, points: OutputPoints) -> Self {
        self.output_points = points;
        self
    }

    pub fn with_significant_digits(mut self, digits: usize) -> Self {
        self.significant_digits = digits;
        self
    }

    pub fn with_scaled_errors(mut self, scale: bool) -> Self {
        self.scale_errors = scale;
        self
    }

    pub fn with_parameter_table(mut self, mode: TableMode) -> Self {
        self.parameter_table = mode;
        self
    }

    pub fn with_hint(mut self, name: &str, hint: ParameterHint) -> Self {
        self.parameters.insert(name.to_string(), hint);
        self
    }

    /// Hold a parameter at `value` during the fit.
    pub fn fix_parameter(self, name: &str, value: f64) -> Self {
        self.with_hint(name, ParameterHint::fixed(value))
    }

    /// Report digits, at least 1 and at most 17.
    pub fn digits(&self) -> usize {
        self.significant_digits.clamp(1, 17)
    }

    /// Check the configuration before any data is touched.
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidTolerance` unless `0 < tolerance < 1`
    /// * `InputError::InvalidMaxIterations` unless `1 <= maxIterations <= 10000`
    /// * `InputError::InvalidOutputPoints` for a curve of fewer than 2 points
    /// * `InputError::InvalidRange` if `xRange` is empty or reversed
    /// * `InputError::InvalidBounds` if a parameter's min is not below its max
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(InputError::InvalidTolerance(self.tolerance).into());
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS_CAP {
            return Err(InputError::InvalidMaxIterations {
                value: self.max_iterations,
                cap: MAX_ITERATIONS_CAP,
            }
            .into());
        }
        if let OutputPoints::Count(n) = self.output_points {
            if n < 2 {
                return Err(InputError::InvalidOutputPoints(n).into());
            }
        }
        if let Some((from, to)) = self.x_range {
            if !(from < to) {
                return Err(InputError::InvalidRange { from, to }.into());
            }
        }
        for (name, hint) in &self.parameters {
            let (min, max) = hint.bounds();
            if hint.has_bounds() && !(min < max) {
                return Err(InputError::InvalidBounds {
                    name: name.clone(),
                    min,
                    max,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read and validate a configuration file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;

    #[test]
    fn test_defaults() {
        let config = FitConfig::default();
        assert_eq!(config.algorithm, Algorithm::ScaledLM);
        assert_eq!(config.tolerance, 1e-4);
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.output_points, OutputPoints::Count(100));
        assert!(config.scale_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_keys() {
        let json = r#"{
            "algorithm": "Simplex",
            "tolerance": 0.001,
            "maxIterations": 200,
            "weighting": "Statistical",
            "xRange": [1.0, 4.0],
            "outputPoints": "sameAsSource",
            "scaleErrorsBySqrtChiSquareOverDoF": false,
            "parameterTable": "shared",
            "parameters": { "y0": { "value": 0.5, "fixed": true } }
        }"#;
        let config = FitConfig::from_json(json).unwrap();

        assert_eq!(config.algorithm, Algorithm::Simplex);
        assert_eq!(config.max_iterations, 200);
        assert_eq!(config.weighting, Weighting::Statistical);
        assert_eq!(config.x_range, Some((1.0, 4.0)));
        assert_eq!(config.output_points, OutputPoints::SameAsSource);
        assert!(!config.scale_errors);
        assert_eq!(config.parameter_table, TableMode::Shared);
        assert_eq!(config.parameters["y0"], ParameterHint::fixed(0.5));
        assert_eq!(config.significant_digits, 6);

        let again = FitConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_output_points_count() {
        let config = FitConfig::from_json(r#"{ "outputPoints": 250 }"#).unwrap();
        assert_eq!(config.output_points, OutputPoints::Count(250));
        assert!(FitConfig::from_json(r#"{ "outputPoints": "everywhere" }"#).is_err());
    }

    #[test]
    fn test_validation() {
        let bad_tolerance = FitConfig::new().with_tolerance(1.0);
        assert!(matches!(
            bad_tolerance.validate(),
            Err(FitError::Input(InputError::InvalidTolerance(_)))
        ));

        let too_many = FitConfig::new().with_max_iterations(MAX_ITERATIONS_CAP + 1);
        assert!(matches!(
            too_many.validate(),
            Err(FitError::Input(InputError::InvalidMaxIterations { .. }))
        ));

        let reversed = FitConfig::new().with_range(3.0, 1.0);
        assert!(matches!(
            reversed.validate(),
            Err(FitError::Input(InputError::InvalidRange { .. }))
        ));

        let bounds = FitConfig::new().with_hint("a", ParameterHint::bounded(2.0, 1.0));
        assert!(matches!(
            bounds.validate(),
            Err(FitError::Input(InputError::InvalidBounds { .. }))
        ));

        let one_point = FitConfig::new().with_output_points(OutputPoints::Count(1));
        assert!(one_point.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.json");
        let config = FitConfig::new()
            .with_algorithm(Algorithm::UnscaledLM)
            .fix_parameter("y0", 0.0);

        config.save_json(&path).unwrap();
        assert_eq!(FitConfig::load_json(&path).unwrap(), config);
    }
}
