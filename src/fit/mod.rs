//! # Fitting
//!
//! Everything around a single optimizer run: the [`FitConfig`] describing how
//! to fit, the [`Fitter`] that validates inputs and drives the optimizer, the
//! [`FitResult`] it returns, and the sinks that receive reports, curves and
//! tables.
//!
//! ## Example Usage
//!
//! ```rust
//! use curvefit_rs::fit::{FitConfig, Fitter};
//! use curvefit_rs::{BuiltinModel, Dataset, FitModel};
//!
//! let x = [0.0, 1.0, 2.0, 3.0];
//! let y = [1.0, 3.0, 5.0, 7.0];
//! let data = Dataset::new("line", &x, &y).unwrap();
//!
//! let fitter = Fitter::new(FitConfig::default());
//! let result = fitter.fit(&data, &FitModel::from(BuiltinModel::Linear)).unwrap();
//!
//! assert!(result.is_converged());
//! assert!((result.value("slope").unwrap() - 2.0).abs() < 1e-4);
//! ```

pub mod config;
pub mod fitter;
pub mod report;
pub mod result;
pub mod sink;

pub use config::{FitConfig, OutputPoints, ParameterHint, TableMode, MAX_ITERATIONS_CAP};
pub use fitter::{fit, Fitter, SHARED_TABLE_TITLE};
pub use report::{fit_report, format_general, plot_summary};
pub use result::{FitCurve, FitResult, FitStatus, ParameterEstimate};
pub use sink::{
    CurveSink, FitObserver, LogSink, ParameterRow, ParameterTable, Recorder, TableSink,
};
