//! Math tools backed by the symbolic engine.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, require_str, Tool};
use crate::sandbox::Sandbox;
use crate::symbolic;

fn variable(args: &Value) -> &str {
    arg_str(args, "variable").unwrap_or("x")
}

fn variable_property() -> Value {
    json!({
        "type": "string",
        "description": "Variable name (default: x)"
    })
}

pub struct Differentiate;

#[async_trait]
impl Tool for Differentiate {
    fn name(&self) -> &str {
        "differentiate"
    }

    fn description(&self) -> &str {
        "Differentiate an expression with respect to a variable, e.g. 'x**3 + sin(x)'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "Expression to differentiate"},
                "variable": variable_property()
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let expression = require_str(&args, "expression")?;
        Ok(symbolic::differentiate(expression, variable(&args))?)
    }
}

pub struct Integrate;

#[async_trait]
impl Tool for Integrate {
    fn name(&self) -> &str {
        "integrate_expression"
    }

    fn description(&self) -> &str {
        "Compute the indefinite integral of an expression (without the constant of integration). Returns Integral(expr, x) when no closed form is found."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "Expression to integrate"},
                "variable": variable_property()
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let expression = require_str(&args, "expression")?;
        Ok(symbolic::integrate_expression(expression, variable(&args))?)
    }
}

pub struct SolveEquation;

#[async_trait]
impl Tool for SolveEquation {
    fn name(&self) -> &str {
        "solve_equation"
    }

    fn description(&self) -> &str {
        "Solve an equation for a variable, e.g. 'x**2 - 4 = 0' or '2*x + 1 = 7'. Without '=' the expression is set equal to zero. Returns the list of roots."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "equation": {"type": "string", "description": "Equation to solve"},
                "variable": variable_property()
            },
            "required": ["equation"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let equation = require_str(&args, "equation")?;
        Ok(symbolic::solve_equation(equation, variable(&args))?)
    }
}

pub struct MatrixOperation;

#[async_trait]
impl Tool for MatrixOperation {
    fn name(&self) -> &str {
        "matrix_operation"
    }

    fn description(&self) -> &str {
        "Matrix algebra: determinant, inverse, transpose of matrix_a, or multiply matrix_a by matrix_b. Matrices are lists of rows; entries may be numbers or expressions."
    }

    fn parameters_schema(&self) -> Value {
        let matrix = json!({
            "type": "array",
            "items": {"type": "array", "items": {"type": ["number", "string"]}}
        });
        json!({
            "type": "object",
            "properties": {
                "matrix_a": matrix,
                "operation": {
                    "type": "string",
                    "enum": ["determinant", "inverse", "transpose", "multiply"]
                },
                "matrix_b": matrix
            },
            "required": ["matrix_a", "operation"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let operation = require_str(&args, "operation")?;
        let matrix_a = args
            .get("matrix_a")
            .ok_or_else(|| anyhow::anyhow!("Missing 'matrix_a' argument"))?;
        let matrix_a = decode_stringified(matrix_a)?;
        let matrix_b = args.get("matrix_b").map(decode_stringified).transpose()?;
        Ok(symbolic::matrix_operation(
            &matrix_a,
            operation,
            matrix_b.as_ref(),
        )?)
    }
}

/// Some models send the matrix as a JSON string instead of an array.
fn decode_stringified(value: &Value) -> anyhow::Result<Value> {
    match value {
        Value::String(s) if s.trim_start().starts_with('[') => serde_json::from_str(s)
            .map_err(|e| anyhow::anyhow!("Matrix is not valid JSON: {}", e)),
        other => Ok(other.clone()),
    }
}

pub struct PreprocessMath;

#[async_trait]
impl Tool for PreprocessMath {
    fn name(&self) -> &str {
        "preprocess_math"
    }

    fn description(&self) -> &str {
        "Normalize loosely written math into parseable syntax: '^' to '**', '2x' to '2*x', 'x(' to 'x*(', '15%' to '(15/100)'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expr": {"type": "string", "description": "Expression to normalize"}
            },
            "required": ["expr"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let expr = require_str(&args, "expr")?;
        Ok(symbolic::preprocess_math(expr))
    }
}

pub struct Calculate;

#[async_trait]
impl Tool for Calculate {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate arithmetic or simplify an expression, e.g. '15% of 200', '2^10', 'sqrt(2)*3'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "Expression to evaluate"}
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let expression = require_str(&args, "expression")?;
        Ok(symbolic::calculate(expression)?)
    }
}
