//! Weighting strategies as seen through complete fits.

use approx::assert_relative_eq;
use curvefit_rs::fit::{FitObserver, FitStatus};
use curvefit_rs::{
    Algorithm, BuiltinModel, Dataset, FitConfig, FitError, FitModel, Fitter, InputError,
    Weighting,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts optimizer runs and iterations.
#[derive(Default)]
struct Counter {
    started: AtomicUsize,
    iterations: AtomicUsize,
    finished: AtomicUsize,
}

impl FitObserver for Counter {
    fn optimization_started(&self, _model: &str, _algorithm: Algorithm, _varying: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn iteration(&self, _iteration: usize, _cost: f64) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
    }

    fn optimization_finished(&self, _status: FitStatus, _iterations: usize) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn line_data() -> (Vec<f64>, Vec<f64>) {
    let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let y = vec![1.2, 2.9, 5.1, 7.0, 8.8, 11.1, 13.0, 14.9, 17.2, 19.0];
    (x, y)
}

#[test]
fn missing_error_column_stops_before_the_optimizer() {
    let (x, y) = line_data();
    let data = Dataset::new("no errors", &x, &y).unwrap();
    let counter = Arc::new(Counter::default());
    let fitter = Fitter::new(FitConfig::new().with_weighting(Weighting::Instrumental))
        .with_observer(counter.clone());

    let err = fitter
        .fit(&data, &BuiltinModel::Linear.into())
        .unwrap_err();

    assert_eq!(
        err.as_input(),
        Some(&InputError::MissingErrorColumn {
            dataset: "no errors".to_string()
        })
    );
    assert_eq!(counter.started.load(Ordering::SeqCst), 0);
    assert_eq!(counter.iterations.load(Ordering::SeqCst), 0);
    assert_eq!(counter.finished.load(Ordering::SeqCst), 0);
}

#[test]
fn observer_sees_a_successful_run() {
    let (x, y) = line_data();
    let data = Dataset::new("line", &x, &y).unwrap();
    let counter = Arc::new(Counter::default());
    let fitter = Fitter::new(FitConfig::new().with_algorithm(Algorithm::Simplex))
        .with_observer(counter.clone());

    let result = fitter.fit(&data, &BuiltinModel::Linear.into()).unwrap();

    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.finished.load(Ordering::SeqCst), 1);
    assert_eq!(counter.iterations.load(Ordering::SeqCst), result.iterations);
}

#[test]
fn short_weight_column_is_a_row_count_mismatch() {
    let (x, y) = line_data();
    let data = Dataset::new("line", &x, &y).unwrap();
    let config = FitConfig::new().with_weighting(Weighting::Arbitrary {
        weights: vec![1.0; 5],
    });

    let err = Fitter::new(config)
        .fit(&data, &BuiltinModel::Linear.into())
        .unwrap_err();

    assert!(matches!(
        err,
        FitError::Input(InputError::RowCountMismatch {
            required: 10,
            available: 5
        })
    ));
}

#[test]
fn weight_column_only_needs_to_cover_the_range() {
    let (x, y) = line_data();
    let data = Dataset::new("line", &x, &y).unwrap();
    let config = FitConfig::new()
        .with_range(0.0, 4.0)
        .with_weighting(Weighting::Arbitrary {
            weights: vec![1.0; 5],
        });

    let result = Fitter::new(config)
        .fit(&data, &BuiltinModel::Linear.into())
        .unwrap();
    assert_eq!(result.points, 5);
    assert_eq!(result.weighting, "Arbitrary dataset");
}

#[test]
fn uniform_errors_scale_chi_square_but_not_parameters() {
    let (x, y) = line_data();
    let errors = vec![0.5; x.len()];
    let plain = Dataset::new("line", &x, &y).unwrap();
    let with_errors = Dataset::new("line", &x, &y).unwrap().with_errors(&errors);
    let model: FitModel = BuiltinModel::Linear.into();
    let base = FitConfig::new().with_tolerance(1e-10);

    let unweighted = Fitter::new(base.clone()).fit(&plain, &model).unwrap();
    let weighted = Fitter::new(base.with_weighting(Weighting::Instrumental))
        .fit(&with_errors, &model)
        .unwrap();

    assert_relative_eq!(
        weighted.value("slope").unwrap(),
        unweighted.value("slope").unwrap(),
        epsilon = 1e-8
    );
    // w = 1/σ² = 4
    assert_relative_eq!(weighted.chi_square, 4.0 * unweighted.chi_square, max_relative = 1e-8);
    // Scaled errors cancel the uniform weight.
    assert_relative_eq!(
        weighted.std_error("slope").unwrap(),
        unweighted.std_error("slope").unwrap(),
        max_relative = 1e-6
    );
    assert_relative_eq!(weighted.r_squared, unweighted.r_squared, epsilon = 1e-10);
}

#[test]
fn small_errors_pull_the_fit() {
    let x = [0.0, 1.0, 2.0, 3.0];
    let y = [0.0, 1.0, 2.0, 6.0];
    let loose_last = [0.01, 0.01, 0.01, 100.0];
    let data = Dataset::new("outlier", &x, &y)
        .unwrap()
        .with_errors(&loose_last);
    let config = FitConfig::new()
        .with_weighting(Weighting::Instrumental)
        .with_tolerance(1e-10);

    let result = Fitter::new(config)
        .fit(&data, &BuiltinModel::Linear.into())
        .unwrap();

    assert_relative_eq!(result.value("slope").unwrap(), 1.0, epsilon = 1e-3);
    assert_relative_eq!(result.value("intercept").unwrap(), 0.0, epsilon = 1e-3);
}

#[test]
fn statistical_weighting_fits_counts() {
    let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
    let y: Vec<f64> = x.iter().map(|v| 200.0 * (-v / 1.5).exp() + 10.0).collect();
    let data = Dataset::new("counts", &x, &y).unwrap();
    let config = FitConfig::new()
        .with_weighting(Weighting::Statistical)
        .with_tolerance(1e-8);

    let result = Fitter::new(config)
        .fit(&data, &curvefit_rs::models::exp_decay(1).into())
        .unwrap();

    assert!(result.is_converged());
    assert_eq!(result.weighting, "Statistical");
    assert_relative_eq!(result.value("t1").unwrap(), 1.5, max_relative = 1e-5);
}
