//! Parameters collection implementation
//!
//! This module provides the Parameters struct, an ordered collection of
//! Parameter objects. The order is the model's parameter order, which is also
//! the order of the optimizer's parameter vector.

use crate::parameters::parameter::{Parameter, ParameterError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// An ordered collection of parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    /// Create a new empty parameters collection
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Build a collection of free, unbounded parameters from names and values
    ///
    /// # Examples
    ///
    /// ```
    /// use curvefit_rs::parameters::Parameters;
    ///
    /// let params = Parameters::from_values(&["slope", "intercept"], &[2.0, 1.0]);
    /// assert_eq!(params.len(), 2);
    /// assert_eq!(params.get("intercept").unwrap().value(), 1.0);
    /// ```
    pub fn from_values<S: AsRef<str>>(names: &[S], values: &[f64]) -> Self {
        let params = names
            .iter()
            .zip(values.iter())
            .map(|(name, &value)| Parameter::new(name.as_ref(), value))
            .collect();
        Self { params }
    }

    /// Append a parameter, replacing any existing parameter of the same name
    pub fn add(&mut self, param: Parameter) {
        match self.index_of(param.name()) {
            Some(i) => self.params[i] = param,
            None => self.params.push(param),
        }
    }

    /// Append a new free parameter with the given name and value
    pub fn add_param(&mut self, name: &str, value: f64) {
        self.add(Parameter::new(name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name() == name)
    }

    /// Like [`Parameters::get_mut`], but reports a missing name as an error
    pub fn require_mut(&mut self, name: &str) -> Result<&mut Parameter, ParameterError> {
        self.get_mut(name)
            .ok_or_else(|| ParameterError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    /// Position of a parameter in the model order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name().to_string()).collect()
    }

    /// All values in model order
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value()).collect()
    }

    /// Indices of the parameters that are varied during optimization
    pub fn varying_indices(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.vary())
            .map(|(i, _)| i)
            .collect()
    }

    /// Values of the varying parameters, the optimizer's starting vector
    pub fn varying_array(&self) -> Array1<f64> {
        self.params
            .iter()
            .filter(|p| p.vary())
            .map(|p| p.value())
            .collect()
    }

    /// Expand a vector of varying values into the full, bound-clamped parameter vector
    ///
    /// `varying` must have one entry per index in [`Parameters::varying_indices`].
    pub fn expand(&self, varying: &Array1<f64>) -> Vec<f64> {
        let mut full = self.values();
        let mut k = 0;
        for (i, param) in self.params.iter().enumerate() {
            if param.vary() {
                full[i] = param.clamp(varying[k]);
                k += 1;
            }
        }
        full
    }

    /// Clamp a vector of varying values into the bounds of the varying parameters
    pub fn clamp_varying(&self, varying: &mut Array1<f64>) {
        for (k, param) in self.params.iter().filter(|p| p.vary()).enumerate() {
            varying[k] = param.clamp(varying[k]);
        }
    }
}
