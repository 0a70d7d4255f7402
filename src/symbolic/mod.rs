//! Symbolic mathematics.
//!
//! A small computer-algebra engine behind the math tools: parsing, canonical
//! simplification, differentiation, rule-based integration, equation solving
//! and matrices. The string functions at the bottom of this module are what
//! the tools call; each takes user text and returns printable text.

pub mod calculus;
mod display;
pub mod expr;
pub mod matrix;
pub mod number;
pub mod parse;
pub mod poly;
mod preprocess;
pub mod solve;

use serde_json::Value;
use thiserror::Error;

pub use expr::Expr;
pub use matrix::Matrix;
pub use preprocess::{format_general, preprocess_math};

/// Largest magnitude printed as an integer by `calculate`.
const MAX_INTEGER_DISPLAY: f64 = 1e15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    #[error("could not parse expression: {0}")]
    Parse(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),

    #[error("Matrix det == 0; not invertible.")]
    Singular,

    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Matrix size mismatch: {0}x{1} times {2}x{3}")]
    ShapeMismatch(usize, usize, usize, usize),

    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),

    #[error("Unsupported operation or missing matrix.")]
    UnsupportedOperation,
}

fn parse_checked(input: &str) -> Result<Expr, MathError> {
    let expr = parse::parse(input)?;
    if expr.is_undefined() {
        return Err(MathError::DivisionByZero);
    }
    Ok(expr)
}

fn check_variable(variable: &str) -> Result<&str, MathError> {
    let name = variable.trim();
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let reserved = matches!(name, "pi" | "E" | "I" | "sqrt") || expr::Func::from_name(name).is_some();
    if !valid_start || reserved || !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return Err(MathError::InvalidVariable(variable.to_string()));
    }
    Ok(name)
}

/// `d/d(variable) expression`, e.g. `"x**3 + 2*x"` → `"3*x**2 + 2"`.
pub fn differentiate(expression: &str, variable: &str) -> Result<String, MathError> {
    let var = check_variable(variable)?;
    let expr = parse_checked(expression)?;
    Ok(calculus::diff(&expr, var).to_string())
}

/// Indefinite integral without the constant, or `Integral(expr, var)` when no
/// antiderivative is found.
pub fn integrate_expression(expression: &str, variable: &str) -> Result<String, MathError> {
    let var = check_variable(variable)?;
    let expr = parse_checked(expression)?;
    Ok(match calculus::integrate(&expr, var) {
        Some(result) => result.to_string(),
        None => format!("Integral({}, {})", expr, var),
    })
}

/// Solve `lhs = rhs` (or `expr = 0`) and print the roots as `[a, b]`.
pub fn solve_equation(equation: &str, variable: &str) -> Result<String, MathError> {
    let var = check_variable(variable)?;
    let normalized = equation.replace("==", "=");
    let sides: Vec<&str> = normalized.split('=').collect();
    let expr = match sides.as_slice() {
        [lhs] => parse_checked(lhs)?,
        [lhs, rhs] => parse_checked(lhs)?.sub(parse_checked(rhs)?),
        _ => {
            return Err(MathError::Parse(
                "an equation has at most one '='".to_string(),
            ));
        }
    };

    let roots = solve::solve(&expr, var)?;
    let printed: Vec<String> = roots.iter().map(Expr::to_string).collect();
    Ok(format!("[{}]", printed.join(", ")))
}

/// `determinant`, `inverse`, `transpose` of `matrix_a`, or `multiply` by
/// `matrix_b`.
pub fn matrix_operation(
    matrix_a: &Value,
    operation: &str,
    matrix_b: Option<&Value>,
) -> Result<String, MathError> {
    let a = Matrix::from_json(matrix_a)?;
    match (operation.trim().to_ascii_lowercase().as_str(), matrix_b) {
        ("determinant", _) => Ok(a.determinant()?.to_string()),
        ("inverse", _) => Ok(a.inverse()?.to_string()),
        ("transpose", _) => Ok(a.transpose().to_string()),
        ("multiply", Some(b)) if !b.is_null() => {
            Ok(a.multiply(&Matrix::from_json(b)?)?.to_string())
        }
        _ => Err(MathError::UnsupportedOperation),
    }
}

/// Evaluate free-form arithmetic: `"15% of 200"` → `"30"`, `"2/3"` →
/// `"0.666667"`. Expressions with free symbols are printed symbolically, in
/// expanded form when that is shorter.
pub fn calculate(expression: &str) -> Result<String, MathError> {
    let raw = preprocess_math(&preprocess::replace_of(expression.trim()));
    let mut expr = parse_checked(&raw)?;

    if expr.has_symbols() {
        let expanded = poly::expand(&expr);
        if expanded.to_string().len() < expr.to_string().len() {
            expr = expanded;
        }
        if expr.has_symbols() {
            return Ok(expr.to_string());
        }
    }
    let Some(value) = expr.evaluate() else {
        return Ok(expr.to_string());
    };
    if !value.is_finite() {
        return Err(MathError::NotFinite);
    }
    if value.fract() == 0.0 && value.abs() < MAX_INTEGER_DISPLAY {
        return Ok(format!("{}", value as i64));
    }
    Ok(format_general(value, 6))
}
