//! The fit orchestrator.
//!
//! [`Fitter::fit`] validates everything it can before an optimizer exists:
//! configuration, range, point count, weights, derivative availability and
//! parameter hints. Any problem there is a typed error with no side effects.
//! Once the optimizer has run, the outcome is always a [`FitResult`], whose
//! status tells whether it converged, ran out of iterations or failed.

use log::{debug, info, warn};
use ndarray::Array1;
use std::sync::{Arc, Mutex};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::data::{Dataset, FilteredData};
use crate::error::{InputError, ModelError, Result};
use crate::fit::config::{FitConfig, OutputPoints, TableMode};
use crate::fit::report::{fit_report, plot_summary};
use crate::fit::result::{FitCurve, FitResult, FitStatus, ParameterEstimate};
use crate::fit::sink::{CurveSink, FitObserver, LogSink, ParameterRow, ParameterTable, TableSink};
use crate::model::{FitModel, JacobianSource, ModelFunction};
use crate::models::breakdown;
use crate::optimizer::Optimizer;
use crate::parameters::Parameters;
use crate::plugin::JACOBIAN_SYMBOL;
use crate::problem::{Problem, ResidualProblem};
use crate::uncertainty::{uncertainty_from_jacobian, UncertaintyResult};

/// Title of the table shared by all fits in `TableMode::Shared`.
pub const SHARED_TABLE_TITLE: &str = "Fit parameters";

/// Fits models to datasets under one configuration.
///
/// Each call builds its own optimizer and residual problem; nothing computed
/// in one fit influences another, so calls may run concurrently.
pub struct Fitter {
    config: FitConfig,
    log: Option<Arc<dyn LogSink>>,
    curves: Option<Arc<dyn CurveSink>>,
    tables: Option<Arc<dyn TableSink>>,
    observer: Option<Arc<dyn FitObserver>>,
    shared: Mutex<ParameterTable>,
}

impl Fitter {
    pub fn new(config: FitConfig) -> Self {
        Self {
            config,
            log: None,
            curves: None,
            tables: None,
            observer: None,
            shared: Mutex::new(ParameterTable::new(SHARED_TABLE_TITLE)),
        }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log = Some(sink);
        self
    }

    pub fn with_curve_sink(mut self, sink: Arc<dyn CurveSink>) -> Self {
        self.curves = Some(sink);
        self
    }

    pub fn with_table_sink(mut self, sink: Arc<dyn TableSink>) -> Self {
        self.tables = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FitObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Rows accumulated so far in shared-table mode.
    pub fn shared_table(&self) -> ParameterTable {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Fit `model` to `dataset`, starting from the model's own initial guess.
    ///
    /// # Errors
    ///
    /// * `InputError` for an invalid configuration, range, point count or weighting
    /// * `ModelError::PluginMissingSymbol` if the algorithm needs derivatives the
    ///   model cannot provide
    pub fn fit(&self, dataset: &Dataset<'_>, model: &FitModel) -> Result<FitResult> {
        self.run(dataset, model, None)
    }

    /// Fit starting from `initial`, one value per model parameter.
    ///
    /// Parameter hints in the configuration still override these values.
    pub fn fit_with_guess(
        &self,
        dataset: &Dataset<'_>,
        model: &FitModel,
        initial: &[f64],
    ) -> Result<FitResult> {
        self.run(dataset, model, Some(initial))
    }

    /// Fit the same model to several datasets, in parallel when the `parallel`
    /// feature is enabled. Results are in dataset order.
    pub fn fit_many(&self, datasets: &[Dataset<'_>], model: &FitModel) -> Vec<Result<FitResult>> {
        #[cfg(feature = "parallel")]
        {
            datasets.par_iter().map(|d| self.fit(d, model)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            datasets.iter().map(|d| self.fit(d, model)).collect()
        }
    }

    fn run(
        &self,
        dataset: &Dataset<'_>,
        model: &FitModel,
        initial: Option<&[f64]>,
    ) -> Result<FitResult> {
        let config = &self.config;
        config.validate()?;
        model.validate()?;

        let data = dataset.filter(config.x_range)?;
        let required = model.min_points();
        if data.len() < required {
            debug!(
                "Rejecting fit of '{}': {} needs {} points, {} in range",
                dataset.name(),
                model.name(),
                required,
                data.len()
            );
            return Err(InputError::InsufficientData {
                required,
                available: data.len(),
            }
            .into());
        }

        let weights = config.weighting.weights(dataset, &data)?;

        if config.algorithm.requires_jacobian() && model.jacobian_source() == JacobianSource::Unavailable {
            return Err(ModelError::PluginMissingSymbol {
                plugin: model.name(),
                symbol: JACOBIAN_SYMBOL.to_string(),
            }
            .into());
        }

        let params = self.initial_parameters(model, &data, initial)?;
        debug!("Initial parameters for {}: {:?}", model.name(), params.values());

        let problem = ResidualProblem::new(model, data.x(), data.y(), &weights, &params)?;

        info!(
            "Fitting {} to '{}' ({} points) with {}",
            model.name(),
            dataset.name(),
            data.len(),
            config.algorithm
        );
        if let Some(observer) = &self.observer {
            observer.optimization_started(&model.name(), config.algorithm, problem.parameter_count());
        }

        let mut optimizer = Optimizer::new(config.algorithm, config.tolerance, config.max_iterations);
        let observer = self.observer.as_deref();
        let outcome = optimizer.run(&problem, params.varying_array(), &mut |iteration, cost| {
            if let Some(observer) = observer {
                observer.iteration(iteration, cost);
            }
        })?;

        let status = FitStatus::from(outcome.state);
        if let Some(observer) = &self.observer {
            observer.optimization_finished(status, outcome.iterations);
        }
        match status {
            FitStatus::Converged => info!(
                "{} converged after {} iterations",
                model.name(),
                outcome.iterations
            ),
            _ => warn!(
                "{} fit of '{}' ended with status '{}': {}",
                model.name(),
                dataset.name(),
                status,
                outcome.message
            ),
        }

        let result = self.package(
            dataset,
            model,
            &data,
            &weights,
            &params,
            &problem,
            &outcome.params,
            status,
            outcome.message,
            outcome.iterations,
            outcome.func_evals,
        );
        self.publish(&result);
        Ok(result)
    }

    /// Initial parameter set: the explicit guess or the model's heuristic, then the
    /// configured hints.
    fn initial_parameters(
        &self,
        model: &FitModel,
        data: &FilteredData,
        initial: Option<&[f64]>,
    ) -> Result<Parameters> {
        let names = model.parameter_names();
        let values = match initial {
            Some(values) => values.to_vec(),
            None => model.initial_guess(data),
        };
        if values.len() != names.len() {
            return Err(InputError::InitialGuessLength {
                expected: names.len(),
                actual: values.len(),
            }
            .into());
        }

        let mut params = Parameters::from_values(&names, &values);
        for (name, hint) in &self.config.parameters {
            let param = params
                .get_mut(name)
                .ok_or_else(|| InputError::UnknownParameter(name.clone()))?;
            if hint.has_bounds() {
                let (min, max) = hint.bounds();
                param
                    .set_bounds(min, max)
                    .map_err(|_| InputError::InvalidBounds {
                        name: name.clone(),
                        min,
                        max,
                    })?;
            }
            let value = hint.value.unwrap_or_else(|| param.value());
            param.set_value(value);
            param.set_vary(!hint.fixed);
        }
        Ok(params)
    }

    #[allow(clippy::too_many_arguments)]
    fn package(
        &self,
        dataset: &Dataset<'_>,
        model: &FitModel,
        data: &FilteredData,
        weights: &Array1<f64>,
        params: &Parameters,
        problem: &ResidualProblem<'_>,
        varying: &Array1<f64>,
        status: FitStatus,
        message: String,
        iterations: usize,
        func_evals: usize,
    ) -> FitResult {
        let config = &self.config;
        let values = problem.full_parameters(varying);
        let residuals = problem.raw_residuals(varying);
        let weighted = problem.sqrt_weights() * &residuals;

        let n = data.len();
        let k = varying.len();
        let dof = n.saturating_sub(k);
        let chi_square: f64 = weighted.iter().map(|r| r * r).sum();
        let reduced_chi_square = if dof > 0 {
            chi_square / dof as f64
        } else {
            f64::NAN
        };

        let weight_sum = weights.sum();
        let mean = if weight_sum > 0.0 {
            (weights * data.y()).sum() / weight_sum
        } else {
            data.y().mean().unwrap_or(0.0)
        };
        let total: f64 = weights
            .iter()
            .zip(data.y().iter())
            .map(|(w, y)| w * (y - mean).powi(2))
            .sum();
        let r_squared = if total > 0.0 {
            1.0 - chi_square / total
        } else if chi_square == 0.0 {
            1.0
        } else {
            0.0
        };
        let adjusted_r_squared = if dof > 0 && n > 1 {
            1.0 - (1.0 - r_squared) * (n - 1) as f64 / dof as f64
        } else {
            r_squared
        };
        let rmse = if n > 0 {
            (chi_square / n as f64).sqrt()
        } else {
            0.0
        };

        let scale = if config.scale_errors && dof > 0 {
            reduced_chi_square
        } else {
            1.0
        };
        let uncertainty = self.uncertainty(problem, params, varying, scale);

        let parameters = params
            .iter()
            .zip(values.iter())
            .zip(uncertainty.standard_errors.iter())
            .map(|((p, &value), &std_error)| ParameterEstimate {
                name: p.name().to_string(),
                value,
                std_error: if p.vary() { std_error } else { 0.0 },
                fixed: !p.vary(),
            })
            .collect();

        FitResult {
            dataset: dataset.name().to_string(),
            algorithm: config.algorithm,
            weighting: config.weighting.label().to_string(),
            tolerance: config.tolerance,
            range: config.x_range,
            points: n,
            parameters,
            covariance: uncertainty.covariance,
            correlation: uncertainty.correlation,
            chi_square,
            reduced_chi_square,
            dof,
            r_squared,
            adjusted_r_squared,
            rmse,
            residuals,
            curve: self.curve(model, data, &values),
            status,
            message,
            iterations,
            func_evals,
            peaks: model
                .peak_layout()
                .map(|(shape, _)| breakdown(shape, &values)),
            model: Arc::new(model.clone()),
        }
    }

    fn uncertainty(
        &self,
        problem: &ResidualProblem<'_>,
        params: &Parameters,
        varying: &Array1<f64>,
        scale: f64,
    ) -> UncertaintyResult {
        let estimate = problem
            .jacobian(varying)
            .and_then(|jac| uncertainty_from_jacobian(&jac, &params.varying_indices(), params.len(), scale));
        match estimate {
            Ok(uncertainty) => uncertainty,
            Err(err) => {
                warn!("Parameter uncertainties unavailable: {}", err);
                UncertaintyResult::zeros(params.len())
            }
        }
    }

    fn curve(&self, model: &FitModel, data: &FilteredData, values: &[f64]) -> FitCurve {
        let x: Vec<f64> = match self.config.output_points {
            OutputPoints::SameAsSource => data.x().to_vec(),
            OutputPoints::Count(points) => match data.x_span() {
                Some((min, max)) => Array1::linspace(min, max, points).to_vec(),
                None => Vec::new(),
            },
        };
        let y = x.iter().map(|&v| model.evaluate(v, values)).collect();
        FitCurve { x, y }
    }

    /// Hand the result to whichever sinks the configuration enables.
    fn publish(&self, result: &FitResult) {
        let config = &self.config;
        let digits = config.digits();

        if config.write_to_log {
            if let Some(log) = &self.log {
                log.append(&fit_report(result, digits, config.covariance_matrix));
            }
        }

        if let Some(curves) = &self.curves {
            if config.plot_curve {
                let label = format!("{} fit of {}", result.model_name(), result.dataset);
                curves.render_curve(&result.dataset, &label, &result.curve);
            }
            if config.paste_to_plot {
                curves.paste_parameters(&result.dataset, &plot_summary(result, digits));
            }
        }

        if let Some(tables) = &self.tables {
            match config.parameter_table {
                TableMode::None => {}
                TableMode::PerFit => {
                    let mut table = ParameterTable::new(&format!(
                        "{} fit of {}",
                        result.model_name(),
                        result.dataset
                    ));
                    table.push(ParameterRow::from_result(result));
                    tables.write_parameters(&table);
                }
                TableMode::Shared => {
                    let snapshot = {
                        let mut shared = self
                            .shared
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        shared.push(ParameterRow::from_result(result));
                        shared.clone()
                    };
                    tables.write_parameters(&snapshot);
                }
            }
            if config.covariance_matrix {
                tables.write_covariance(
                    &format!("Covariance of {} fit of {}", result.model_name(), result.dataset),
                    &result.parameter_names(),
                    &result.covariance,
                );
            }
        }
    }
}

impl Default for Fitter {
    fn default() -> Self {
        Self::new(FitConfig::default())
    }
}

impl std::fmt::Debug for Fitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fitter")
            .field("config", &self.config)
            .field("log", &self.log.is_some())
            .field("curves", &self.curves.is_some())
            .field("tables", &self.tables.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Fit `model` to `dataset` under `config` without any sinks.
pub fn fit(dataset: &Dataset<'_>, model: &FitModel, config: &FitConfig) -> Result<FitResult> {
    Fitter::new(config.clone()).fit(dataset, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuiltinModel;
    use crate::optimizer::Algorithm;
    use crate::error::FitError;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_fit_statistics() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.1, 2.9, 5.2, 6.8, 9.1];
        let data = Dataset::new("noisy line", &x, &y).unwrap();
        let model = FitModel::from(BuiltinModel::Linear);

        let result = Fitter::default().fit(&data, &model).unwrap();

        assert_eq!(result.status, FitStatus::Converged);
        assert_eq!(result.dof, 3);
        assert_relative_eq!(result.value("slope").unwrap(), 1.99, epsilon = 1e-4);
        assert_relative_eq!(result.value("intercept").unwrap(), 1.04, epsilon = 1e-4);
        assert!(result.r_squared > 0.99 && result.r_squared < 1.0);
        assert_relative_eq!(
            result.reduced_chi_square,
            result.chi_square / 3.0,
            epsilon = 1e-12
        );
        assert!(result.std_error("slope").unwrap() > 0.0);
        assert_eq!(result.curve.len(), 100);
    }

    #[test]
    fn test_unknown_hint_is_rejected() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0, 2.0];
        let data = Dataset::new("line", &x, &y).unwrap();
        let config = FitConfig::new().fix_parameter("nope", 1.0);

        let err = fit(&data, &BuiltinModel::Linear.into(), &config).unwrap_err();
        assert_eq!(err.as_input(), Some(&InputError::UnknownParameter("nope".to_string())));
    }

    #[test]
    fn test_fixed_parameter_keeps_value() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.5, 2.5, 4.5, 6.5];
        let data = Dataset::new("line", &x, &y).unwrap();
        let config = FitConfig::new()
            .with_algorithm(Algorithm::ScaledLM)
            .fix_parameter("intercept", 0.0);

        let result = fit(&data, &BuiltinModel::Linear.into(), &config).unwrap();
        let intercept = result.parameter("intercept").unwrap();
        assert!(intercept.fixed);
        assert_eq!(intercept.value, 0.0);
        assert_eq!(intercept.std_error, 0.0);
        assert_eq!(result.dof, 3);
        // Least squares through the origin: Σxy / Σx²
        assert_relative_eq!(result.value("slope").unwrap(), 31.0 / 14.0, epsilon = 1e-4);
    }

    #[test]
    fn test_wrong_guess_length() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 1.0, 2.0];
        let data = Dataset::new("line", &x, &y).unwrap();
        let err = Fitter::default()
            .fit_with_guess(&data, &BuiltinModel::Linear.into(), &[1.0])
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::Input(InputError::InitialGuessLength { expected: 2, actual: 1 })
        ));
    }
}
