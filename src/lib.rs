//! # curvefit-rs
//!
//! `curvefit-rs` is a nonlinear curve-fitting engine: given a curve of
//! `(x, y)` points, a model and a fit configuration, it finds the parameter
//! values that minimize the weighted sum of squared residuals and reports their
//! uncertainties and goodness-of-fit statistics.
//!
//! The library provides:
//! - Built-in models (linear, polynomial, exponential, logistic, Boltzmann,
//!   Gaussian and Lorentzian peak sums), user-defined formula models and
//!   dynamically loaded plugin models, all behind one [`ModelCatalog`]
//! - Nelder-Mead simplex and scaled/unscaled Levenberg-Marquardt optimizers
//! - Weighting from instrumental errors, Poisson statistics or arbitrary columns
//! - Covariance, standard errors, χ², R² and a generated fit curve per fit
//! - A seeded multi-peak fitting state machine
//!
//! ## Basic Usage
//!
//! ```rust
//! use curvefit_rs::{Dataset, FitConfig, Fitter, ModelCatalog};
//!
//! let x = [0.0, 1.0, 2.0, 3.0, 4.0];
//! let y = [5.0, 3.1, 1.9, 1.2, 0.7];
//! let data = Dataset::new("decay", &x, &y).unwrap();
//!
//! let catalog = ModelCatalog::new();
//! let model = catalog.resolve("ExpDecay1").unwrap();
//!
//! let result = Fitter::new(FitConfig::default()).fit(&data, &model).unwrap();
//! assert!(result.is_converged());
//! assert!(result.r_squared > 0.99);
//! ```

// Public modules
pub mod error;

// Data and weighting
pub mod data;
pub mod weighting;

// Parameter system
pub mod parameters;

// Optimizers
pub mod lm;
pub mod optimizer;
pub mod problem;
pub mod simplex;

pub mod uncertainty;
pub mod utils;

// Models
pub mod catalog;
pub mod model;
pub mod models;
pub mod plugin;

// Orchestration
pub mod fit;
pub mod multipeak;

// Re-exports for convenience
pub use catalog::ModelCatalog;
pub use data::{Dataset, FilteredData};
pub use error::{FitError, InputError, ModelError, Result};
pub use fit::{FitConfig, FitResult, FitStatus, Fitter};
pub use model::{FitModel, JacobianSource, ModelCategory, ModelFunction};
pub use models::{BuiltinModel, PeakInfo, PeakSeed, PeakShape, UserFunction};
pub use multipeak::{MultiPeakFit, MultiPeakState};
pub use optimizer::Algorithm;
pub use parameters::{Parameter, Parameters};
pub use plugin::PluginModel;
pub use problem::Problem;
pub use weighting::Weighting;

#[cfg(feature = "plugins")]
pub use plugin::load_plugin;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
