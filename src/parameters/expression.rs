//! Expression parsing and evaluation for user-defined models
//!
//! A user model is written as a plain formula such as `A*exp(-x/t) + y0`. The
//! formula is parsed once, at registration time, into an [`Expression`] tree that
//! is then evaluated for every data point during a fit.
//!
//! Grammar, lowest to highest precedence:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | '+' unary | power
//! power   := primary ('^' unary)?
//! primary := number | call | identifier | '(' expr ')'
//! ```
//!
//! `+`, `-`, `*` and `/` associate to the left, `^` to the right, and `-x^2` is
//! `-(x^2)`.

use nom::{
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of},
    branch::alt,
    bytes::complete::tag,
    combinator::{map_res, recognize},
    multi::many0,
    number::complete::recognize_float,
    sequence::pair,
    IResult, Parser,
};
use std::collections::HashMap;
use thiserror::Error;

/// Error that can occur during expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression: {message}")]
    ParseError { message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },
}

/// Result type for expression evaluation
pub type ExprResult<T> = Result<T, ExpressionError>;

/// Math functions understood by every expression.
pub const MATH_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "ln", "log",
    "log10", "sqrt", "abs", "sign", "pow", "min", "max",
];

/// Named constants understood by every expression.
pub const CONSTANTS: &[(&str, f64)] = &[("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant number
    Number(f64),

    /// Variable reference
    Variable(String),

    /// Unary operations
    Unary(UnaryOp, Box<Expression>),

    /// Binary operations
    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call, either a math function or another registered model
    Function(String, Vec<Expression>),
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Context for expression evaluation, providing variable values and
/// resolving calls that are not math functions
pub trait EvaluationContext {
    /// Get the value of a variable
    fn get_variable(&self, name: &str) -> ExprResult<f64>;

    /// Evaluate a call to a function that is not in [`MATH_FUNCTIONS`]
    ///
    /// The default knows no such functions.
    fn call_function(&self, name: &str, _args: &[f64]) -> ExprResult<f64> {
        Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        })
    }
}

impl EvaluationContext for HashMap<String, f64> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    /// Parse an expression from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use curvefit_rs::parameters::expression::Expression;
    /// use std::collections::HashMap;
    ///
    /// let expr = Expression::parse("a*x^2 - b").unwrap();
    /// let vars: HashMap<String, f64> =
    ///     [("a".to_string(), 2.0), ("b".to_string(), 1.0), ("x".to_string(), 3.0)]
    ///         .into_iter()
    ///         .collect();
    /// assert_eq!(expr.evaluate(&vars).unwrap(), 17.0);
    /// ```
    pub fn parse(input: &str) -> ExprResult<Self> {
        if input.trim().is_empty() {
            return Err(ExpressionError::ParseError {
                message: "empty expression".to_string(),
            });
        }

        match expr_parser(input.trim()) {
            Ok((remainder, expr)) => {
                if remainder.trim().is_empty() {
                    Ok(expr)
                } else {
                    Err(ExpressionError::ParseError {
                        message: format!("unexpected trailing characters: '{}'", remainder),
                    })
                }
            }
            Err(e) => Err(ExpressionError::ParseError {
                message: format!("{:?}", e),
            }),
        }
    }

    /// Evaluate the expression with the given context
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),

            Self::Variable(name) => match constant(name) {
                Some(value) => Ok(value),
                None => context.get_variable(name),
            },

            Self::Unary(UnaryOp::Neg, expr) => Ok(-expr.evaluate(context)?),

            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;

                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            Err(ExpressionError::DivisionByZero)
                        } else {
                            Ok(lhs / rhs)
                        }
                    }
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }

            Self::Function(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<f64>>>()?;

                if is_math_function(name) {
                    apply_math(name, &values)
                } else {
                    context.call_function(name, &values)
                }
            }
        }
    }

    /// Find all variable names used in the expression, excluding named constants
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.walk(&mut |node| {
            if let Self::Variable(name) = node {
                if constant(name).is_none() {
                    vars.push(name.clone());
                }
            }
        });
        vars.sort();
        vars.dedup();
        vars
    }

    /// Names of called functions that are not math functions
    pub fn called_functions(&self) -> Vec<String> {
        let mut calls = Vec::new();
        self.walk(&mut |node| {
            if let Self::Function(name, _) = node {
                if !is_math_function(name) {
                    calls.push(name.clone());
                }
            }
        });
        calls.sort();
        calls.dedup();
        calls
    }

    fn walk<F: FnMut(&Expression)>(&self, visit: &mut F) {
        visit(self);
        match self {
            Self::Number(_) | Self::Variable(_) => {}
            Self::Unary(_, expr) => expr.walk(visit),
            Self::Binary(_, left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

/// Whether `name` is one of the math functions
pub fn is_math_function(name: &str) -> bool {
    MATH_FUNCTIONS.contains(&name)
}

fn constant(name: &str) -> Option<f64> {
    CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
}

fn apply_math(name: &str, args: &[f64]) -> ExprResult<f64> {
    let arity = |expected: usize| -> ExprResult<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ExpressionError::InvalidOperation {
                message: format!(
                    "{}() requires {} argument(s), got {}",
                    name,
                    expected,
                    args.len()
                ),
            })
        }
    };

    match name {
        "min" | "max" => {
            if args.len() < 2 {
                return Err(ExpressionError::InvalidOperation {
                    message: format!("{}() requires at least 2 arguments, got {}", name, args.len()),
                });
            }
            if name == "min" {
                Ok(args.iter().fold(f64::INFINITY, |a, &b| a.min(b)))
            } else {
                Ok(args.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)))
            }
        }
        "pow" => {
            arity(2)?;
            Ok(args[0].powf(args[1]))
        }
        _ => {
            arity(1)?;
            let v = args[0];
            Ok(match name {
                "sin" => v.sin(),
                "cos" => v.cos(),
                "tan" => v.tan(),
                "asin" => v.asin(),
                "acos" => v.acos(),
                "atan" => v.atan(),
                "sinh" => v.sinh(),
                "cosh" => v.cosh(),
                "tanh" => v.tanh(),
                "exp" => v.exp(),
                "ln" | "log" => v.ln(),
                "log10" => v.log10(),
                "sqrt" => v.sqrt(),
                "abs" => v.abs(),
                "sign" => {
                    if v > 0.0 {
                        1.0
                    } else if v < 0.0 {
                        -1.0
                    } else {
                        0.0
                    }
                }
                _ => {
                    return Err(ExpressionError::UndefinedFunction {
                        name: name.to_string(),
                    })
                }
            })
        }
    }
}

// Parser functions using nom

/// Parse an identifier (variable or function name)
fn identifier(input: &str) -> IResult<&str, String> {
    let mut parser = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ));

    let (input, matched) = parser.parse(input)?;
    Ok((input, matched.to_string()))
}

/// Parse a comma-separated list of expressions (for function arguments)
fn args_list(input: &str) -> IResult<&str, Vec<Expression>> {
    let (mut input, first) = expr_parser(input)?;
    let mut args = vec![first];

    loop {
        let (rest, _) = multispace0.parse(input)?;
        match char::<_, nom::error::Error<_>>(',').parse(rest) {
            Ok((after_comma, _)) => {
                let (after_expr, expr) = expr_parser(after_comma)?;
                args.push(expr);
                input = after_expr;
            }
            Err(_) => return Ok((input, args)),
        }
    }
}

/// Parse a function call
fn function_call(input: &str) -> IResult<&str, Expression> {
    let (input, name) = identifier(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char('(').parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    if let Ok((input, _)) = char::<_, nom::error::Error<_>>(')').parse(input) {
        return Ok((input, Expression::Function(name, vec![])));
    }

    let (input, args) = args_list(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, Expression::Function(name, args)))
}

/// Parse an unsigned number, `2`, `0.5`, `1e-3`
fn number(input: &str) -> IResult<&str, Expression> {
    // Signs belong to the unary rule, not the literal.
    if input.starts_with(['+', '-']) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        )));
    }
    let (input, value) = map_res(recognize_float, |s: &str| s.parse::<f64>()).parse(input)?;
    Ok((input, Expression::Number(value)))
}

/// Parse a variable reference
fn variable(input: &str) -> IResult<&str, Expression> {
    let (input, name) = identifier(input)?;
    Ok((input, Expression::Variable(name)))
}

/// Parse a parenthesized expression
fn parens(input: &str) -> IResult<&str, Expression> {
    let (input, _) = char('(').parse(input)?;
    let (input, expr) = expr_parser(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(')').parse(input)?;
    Ok((input, expr))
}

/// Parse a primary expression (number, function call, variable, or parenthesized expression)
fn primary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0.parse(input)?;
    alt((number, function_call, variable, parens)).parse(input)
}

/// Parse a signed expression
fn unary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0.parse(input)?;

    if let Ok((rest, sign)) = one_of::<_, _, nom::error::Error<_>>("+-").parse(input) {
        let (rest, expr) = unary(rest)?;
        return Ok(match sign {
            '-' => (rest, Expression::Unary(UnaryOp::Neg, Box::new(expr))),
            _ => (rest, expr),
        });
    }

    power(input)
}

/// Parse a power expression, right associative
fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary(input)?;
    let (after_space, _) = multispace0.parse(input)?;

    match char::<_, nom::error::Error<_>>('^').parse(after_space) {
        Ok((after_op, _)) => {
            let (rest, exponent) = unary(after_op)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

/// Parse a left-associative chain of multiplications and divisions
fn term(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut left) = unary(input)?;

    loop {
        let (after_space, _) = multispace0.parse(input)?;
        let op = match one_of::<_, _, nom::error::Error<_>>("*/").parse(after_space) {
            Ok((rest, '*')) => (rest, BinaryOp::Mul),
            Ok((rest, _)) => (rest, BinaryOp::Div),
            Err(_) => return Ok((input, left)),
        };
        let (rest, right) = unary(op.0)?;
        left = Expression::Binary(op.1, Box::new(left), Box::new(right));
        input = rest;
    }
}

/// Parse a left-associative chain of additions and subtractions
fn expr_parser(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut left) = term(input)?;

    loop {
        let (after_space, _) = multispace0.parse(input)?;
        let op = match one_of::<_, _, nom::error::Error<_>>("+-").parse(after_space) {
            Ok((rest, '+')) => (rest, BinaryOp::Add),
            Ok((rest, _)) => (rest, BinaryOp::Sub),
            Err(_) => return Ok((input, left)),
        };
        let (rest, right) = term(op.0)?;
        left = Expression::Binary(op.1, Box::new(left), Box::new(right));
        input = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn context(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    fn eval(input: &str, pairs: &[(&str, f64)]) -> f64 {
        Expression::parse(input)
            .unwrap()
            .evaluate(&context(pairs))
            .unwrap()
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(Expression::parse("42").unwrap(), Expression::Number(42.0));
        assert_eq!(Expression::parse("1e-3").unwrap(), Expression::Number(1e-3));
        assert_eq!(
            Expression::parse("-2.5").unwrap(),
            Expression::Unary(UnaryOp::Neg, Box::new(Expression::Number(2.5)))
        );
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(eval("10 - 4 - 3", &[]), 3.0);
        assert_eq!(eval("24 / 4 / 2", &[]), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), 512.0);
        assert_eq!(eval("-x^2", &[("x", 3.0)]), -9.0);
        assert_eq!(eval("2^-1", &[]), 0.5);
    }

    #[test]
    fn test_model_formula() {
        let value = eval(
            "A*exp(-x/t) + y0",
            &[("A", 2.0), ("t", 0.5), ("y0", 1.0), ("x", 1.0)],
        );
        assert_relative_eq!(value, 2.0 * (-2.0_f64).exp() + 1.0);

        assert_relative_eq!(eval("sin(pi/2) * e", &[]), std::f64::consts::E);
        assert_eq!(eval("max(x, 5, 2)", &[("x", 3.0)]), 5.0);
    }

    #[test]
    fn test_variables_and_calls() {
        let expr = Expression::parse("a*g(x) + b*sin(x) + pi").unwrap();
        assert_eq!(expr.variables(), vec!["a", "b", "x"]);
        assert_eq!(expr.called_functions(), vec!["g"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("a +").is_err());
        assert!(Expression::parse("(a + b").is_err());
        assert!(Expression::parse("2x").is_err());
        assert!(Expression::parse("a $ b").is_err());
    }

    #[test]
    fn test_evaluation_errors() {
        let ctx = context(&[]);

        match Expression::parse("x").unwrap().evaluate(&ctx) {
            Err(ExpressionError::UndefinedVariable { name }) => assert_eq!(name, "x"),
            other => panic!("Expected UndefinedVariable error, got {:?}", other),
        }

        assert_eq!(
            Expression::parse("1 / 0").unwrap().evaluate(&ctx),
            Err(ExpressionError::DivisionByZero)
        );

        match Expression::parse("foo(1)").unwrap().evaluate(&ctx) {
            Err(ExpressionError::UndefinedFunction { name }) => assert_eq!(name, "foo"),
            other => panic!("Expected UndefinedFunction error, got {:?}", other),
        }

        assert!(matches!(
            Expression::parse("sin(1, 2)").unwrap().evaluate(&ctx),
            Err(ExpressionError::InvalidOperation { .. })
        ));
    }
}
