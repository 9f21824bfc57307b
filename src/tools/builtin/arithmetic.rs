// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Arithmetic tools
//!
//! `add`, `subtract` and `multiply` over two operands `a` and `b`. Operands
//! may be JSON numbers or numeric strings; the answer is `{"result": n}`.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ParleyError, Result};
use crate::llm::provider::ToolDefinition;
use crate::tools::{SchemaBuilder, ToolExecutor};

/// Tool for adding two numbers
pub struct AddTool;

/// Tool for subtracting two numbers
pub struct SubtractTool;

/// Tool for multiplying two numbers
pub struct MultiplyTool;

fn binary_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: SchemaBuilder::new()
            .number("a", "First operand", true)
            .number("b", "Second operand", true)
            .build(),
    }
}

fn operand(args: &Value, key: &str) -> Result<f64> {
    match &args[key] {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ParleyError::ToolExecution(format!("{key} is out of range"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ParleyError::ToolExecution(format!("{key} is not a number: {s:?}"))),
        Value::Null => Err(ParleyError::ToolExecution(format!("{key} is required"))),
        other => Err(ParleyError::ToolExecution(format!(
            "{key} must be a number, got {other}"
        ))),
    }
}

/// Whole results are reported as integers.
fn result_payload(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!({ "result": value as i64 })
    } else {
        json!({ "result": value })
    }
}

#[async_trait]
impl ToolExecutor for AddTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition("add", "Add two numbers together and return the sum.")
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        Ok(result_payload(operand(&args, "a")? + operand(&args, "b")?))
    }
}

#[async_trait]
impl ToolExecutor for SubtractTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition(
            "subtract",
            "Subtract the second number from the first and return the difference.",
        )
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        Ok(result_payload(operand(&args, "a")? - operand(&args, "b")?))
    }
}

#[async_trait]
impl ToolExecutor for MultiplyTool {
    fn definition(&self) -> ToolDefinition {
        binary_definition("multiply", "Multiply two numbers and return the product.")
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        Ok(result_payload(operand(&args, "a")? * operand(&args, "b")?))
    }
}
