//! # Parameter System
//!
//! Named, ordered model parameters, plus the expression language user-defined
//! models are written in.
//!
//! - [`Parameter`]: a single parameter with a value, a varying flag and optional bounds
//! - [`Parameters`]: the ordered collection a model exposes, mapped to and from the
//!   optimizer's vector of varying values
//! - [`Expression`]: parse and evaluate formulas such as `A*exp(-x/t) + y0`
//!
//! ## Example Usage
//!
//! ```rust
//! use curvefit_rs::parameters::Parameters;
//! use ndarray::array;
//!
//! let mut params = Parameters::from_values(&["A", "t", "y0"], &[3.0, 0.5, 0.1]);
//!
//! // Hold the offset fixed and keep the decay time positive
//! params.get_mut("y0").unwrap().set_vary(false);
//! params.get_mut("t").unwrap().set_bounds(0.0, f64::INFINITY).unwrap();
//!
//! // The optimizer only sees the varying parameters
//! assert_eq!(params.varying_array(), array![3.0, 0.5]);
//!
//! // A step that leaves the bounds is clamped back into them
//! assert_eq!(params.expand(&array![2.0, -1.0]), vec![2.0, 0.0, 0.1]);
//! ```

pub mod expression;
pub mod parameter;
pub mod parameters;

pub use expression::{EvaluationContext, Expression, ExpressionError};
pub use parameter::{Parameter, ParameterError};
pub use parameters::Parameters;
