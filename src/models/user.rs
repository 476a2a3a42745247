//! Models defined by a textual expression.
//!
//! The independent variable is always `x`; every other free identifier is a
//! parameter. An expression may call previously registered user functions as
//! `g(x)`, in which case the callee's parameters become parameters of the caller,
//! shared by name.

use std::sync::Arc;

use crate::data::FilteredData;
use crate::error::ModelError;
use crate::model::{JacobianSource, ModelFunction};
use crate::models::BuiltinModel;
use crate::parameters::expression::{
    is_math_function, EvaluationContext, ExprResult, Expression, ExpressionError, CONSTANTS,
};

/// Name of the independent variable in user expressions.
pub const INDEPENDENT_VARIABLE: &str = "x";

/// A user function called from another, with its parameters mapped into the
/// caller's parameter vector.
#[derive(Debug, Clone)]
struct Callee {
    function: Arc<UserFunction>,
    mapping: Vec<usize>,
}

/// A model parsed from a formula such as `A*exp(-x/t) + y0`.
#[derive(Debug, Clone)]
pub struct UserFunction {
    name: String,
    source: String,
    expression: Expression,
    parameters: Vec<String>,
    callees: Vec<Callee>,
}

impl UserFunction {
    /// Parse a self-contained user function.
    ///
    /// # Errors
    ///
    /// * `ModelError::InvalidName` / `ModelError::NameCollision` for unusable names
    /// * `ModelError::Parse` if the formula is not a valid expression
    /// * `ModelError::RecursiveDefinition` if the formula calls itself
    /// * `ModelError::UnknownFunction` if it calls anything but math functions
    pub fn new(name: &str, source: &str) -> Result<Self, ModelError> {
        Self::with_functions(name, source, |_| None)
    }

    /// Parse a user function whose calls are resolved through `resolve`.
    pub(crate) fn with_functions<F>(name: &str, source: &str, resolve: F) -> Result<Self, ModelError>
    where
        F: Fn(&str) -> Option<Arc<UserFunction>>,
    {
        validate_name(name)?;
        let expression = parse(source)?;

        let mut functions = Vec::new();
        for call in expression.called_functions() {
            if call == name {
                return Err(ModelError::RecursiveDefinition {
                    name: name.to_string(),
                    chain: format!("{} -> {}", name, name),
                });
            }
            match resolve(&call) {
                Some(function) => functions.push(function),
                None => {
                    return Err(ModelError::UnknownFunction {
                        model: name.to_string(),
                        name: call,
                    })
                }
            }
        }

        let mut parameters: Vec<String> = expression
            .variables()
            .into_iter()
            .filter(|v| v != INDEPENDENT_VARIABLE)
            .collect();
        for function in &functions {
            parameters.extend(function.parameters.iter().cloned());
        }
        parameters.sort();
        parameters.dedup();

        let callees = functions
            .into_iter()
            .map(|function| {
                let mapping = function
                    .parameters
                    .iter()
                    .filter_map(|p| parameters.iter().position(|q| q == p))
                    .collect();
                Callee { function, mapping }
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            source: source.trim().to_string(),
            expression,
            parameters,
            callees,
        })
    }

    /// The formula as written by the user.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the user functions this one calls directly.
    pub fn calls(&self) -> Vec<String> {
        self.expression.called_functions()
    }

    /// Evaluate, reporting why evaluation failed instead of returning NaN.
    pub fn try_evaluate(&self, x: f64, params: &[f64]) -> ExprResult<f64> {
        self.expression.evaluate(&Scope {
            function: self,
            x,
            params,
        })
    }
}

impl ModelFunction for UserFunction {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn formula(&self) -> String {
        format!("y = {}", self.source)
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.clone()
    }

    fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.try_evaluate(x, params).unwrap_or(f64::NAN)
    }

    fn jacobian_source(&self) -> JacobianSource {
        JacobianSource::Numeric
    }

    /// Nothing is known about the shape of an arbitrary formula; start every
    /// parameter at one.
    fn initial_guess(&self, _data: &FilteredData) -> Vec<f64> {
        vec![1.0; self.parameters.len()]
    }
}

/// Variable and call bindings while evaluating one point.
struct Scope<'a> {
    function: &'a UserFunction,
    x: f64,
    params: &'a [f64],
}

impl EvaluationContext for Scope<'_> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        if name == INDEPENDENT_VARIABLE {
            return Ok(self.x);
        }
        self.function
            .parameters
            .iter()
            .position(|p| p == name)
            .map(|i| self.params[i])
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn call_function(&self, name: &str, args: &[f64]) -> ExprResult<f64> {
        let callee = self
            .function
            .callees
            .iter()
            .find(|c| c.function.name == name)
            .ok_or_else(|| ExpressionError::UndefinedFunction {
                name: name.to_string(),
            })?;
        if args.len() != 1 {
            return Err(ExpressionError::InvalidOperation {
                message: format!("{} takes exactly one argument, got {}", name, args.len()),
            });
        }

        let values: Vec<f64> = callee.mapping.iter().map(|&i| self.params[i]).collect();
        callee.function.try_evaluate(args[0], &values)
    }
}

fn parse(source: &str) -> Result<Expression, ModelError> {
    Expression::parse(source).map_err(|err| ModelError::Parse {
        expression: source.to_string(),
        message: match err {
            ExpressionError::ParseError { message } => message,
            other => other.to_string(),
        },
    })
}

/// A user function name must be an identifier that does not shadow the
/// independent variable, a constant, a math function or a built-in model.
pub(crate) fn validate_name(name: &str) -> Result<(), ModelError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid || name == INDEPENDENT_VARIABLE {
        return Err(ModelError::InvalidName(name.to_string()));
    }

    let reserved = is_math_function(name)
        || CONSTANTS.iter().any(|(c, _)| *c == name)
        || BuiltinModel::is_builtin_name(name);
    if reserved {
        return Err(ModelError::NameCollision(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameters_exclude_x_and_constants() {
        let f = UserFunction::new("decay", "A*exp(-x/t) + y0 + 0*pi").unwrap();
        assert_eq!(f.parameter_names(), vec!["A", "t", "y0"]);
        assert_relative_eq!(f.evaluate(0.0, &[2.0, 1.0, 0.5]), 2.5);
    }

    #[test]
    fn test_evaluation_failure_is_nan() {
        let f = UserFunction::new("ratio", "a/x").unwrap();
        assert!(f.evaluate(0.0, &[1.0]).is_nan());
        assert_eq!(f.try_evaluate(0.0, &[1.0]), Err(ExpressionError::DivisionByZero));
    }

    #[test]
    fn test_name_rules() {
        assert!(matches!(
            UserFunction::new("Gauss", "a*x"),
            Err(ModelError::NameCollision(_))
        ));
        assert!(matches!(
            UserFunction::new("sin", "a*x"),
            Err(ModelError::NameCollision(_))
        ));
        assert!(matches!(
            UserFunction::new("x", "a*x"),
            Err(ModelError::InvalidName(_))
        ));
        assert!(matches!(
            UserFunction::new("2f", "a*x"),
            Err(ModelError::InvalidName(_))
        ));
    }

    #[test]
    fn test_self_call_is_recursive() {
        assert!(matches!(
            UserFunction::new("f", "a*f(x)"),
            Err(ModelError::RecursiveDefinition { .. })
        ));
        assert!(matches!(
            UserFunction::new("f", "a*g(x)"),
            Err(ModelError::UnknownFunction { name, .. }) if name == "g"
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            UserFunction::new("f", "a*(x+"),
            Err(ModelError::Parse { .. })
        ));
    }

    #[test]
    fn test_calls_share_parameters_by_name() {
        let g = Arc::new(UserFunction::new("g", "a*x + b").unwrap());
        let f = UserFunction::with_functions("f", "c*g(x^2) + a", |name| {
            (name == "g").then(|| Arc::clone(&g))
        })
        .unwrap();

        assert_eq!(f.parameter_names(), vec!["a", "b", "c"]);
        // c * (a x² + b) + a at x = 2, a = 1, b = 3, c = 2
        assert_relative_eq!(f.evaluate(2.0, &[1.0, 3.0, 2.0]), 15.0);
    }
}
