//! Parameter definition and implementation
//!
//! This module provides the Parameter struct, the building block of a model's
//! ordered parameter list. Parameters can be held fixed during optimization and
//! can carry min/max bounds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Invalid bounds for parameter '{name}': min {min} must be below max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },
}

/// A single fit parameter
///
/// The value is the starting point before a fit and the estimate after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    name: String,

    /// Current value of the parameter
    value: f64,

    /// Whether this parameter can be varied during optimization
    vary: bool,

    /// Lower bound, `-inf` when unbounded
    min: f64,

    /// Upper bound, `+inf` when unbounded
    max: f64,
}

impl Parameter {
    /// Create a new, free, unbounded parameter
    ///
    /// # Examples
    ///
    /// ```
    /// use curvefit_rs::parameters::Parameter;
    ///
    /// let param = Parameter::new("xc", 10.0);
    /// assert_eq!(param.name(), "xc");
    /// assert_eq!(param.value(), 10.0);
    /// assert!(param.vary());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            vary: true,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Create a new parameter restricted to `[min, max]`
    ///
    /// The value is clamped into the bounds.
    ///
    /// # Errors
    ///
    /// * `ParameterError::InvalidBounds` if `min >= max`
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let mut param = Self::new(name, value);
        param.set_bounds(min, max)?;
        Ok(param)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, clamped into the parameter's bounds
    pub fn set_value(&mut self, value: f64) {
        self.value = self.clamp(value);
    }

    pub fn vary(&self) -> bool {
        self.vary
    }

    /// Set whether the parameter is varied (`true`) or held fixed (`false`)
    pub fn set_vary(&mut self, vary: bool) {
        self.vary = vary;
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Replace the bounds and clamp the current value into them
    ///
    /// # Errors
    ///
    /// * `ParameterError::InvalidBounds` if `min >= max` or either bound is NaN
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        if !(min < max) {
            return Err(ParameterError::InvalidBounds {
                name: self.name.clone(),
                min,
                max,
            });
        }
        self.min = min;
        self.max = max;
        self.value = self.clamp(self.value);
        Ok(())
    }

    /// Whether the parameter carries a finite bound on either side
    pub fn is_bounded(&self) -> bool {
        self.min.is_finite() || self.max.is_finite()
    }

    /// Clamp a candidate value into the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}
