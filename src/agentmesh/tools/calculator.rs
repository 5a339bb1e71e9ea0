//! Calculator tool.
//!
//! A directly-callable [`Tool`] that evaluates a mathematical expression and
//! returns the result as text. Handy as the canonical "direct tool" in tests
//! and demos of the tool invocation protocol.
//!
//! Supported syntax is whatever [`evalexpr`] accepts: arithmetic operators,
//! parentheses, comparison and boolean operators, and its built-in functions
//! (`min`, `max`, `floor`, `ceil`, ...).

use std::sync::Arc;

use crate::agentmesh::tool::{Tool, ToolError};

/// Build the calculator tool descriptor.
pub fn calculator_tool() -> Tool {
    Tool::callable(
        "calculator",
        "Evaluates a mathematical expression and returns the numeric result.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. \"(2 + 3) * 4\""
                }
            },
            "required": ["expression"]
        }),
        Arc::new(|arguments| {
            let expression = arguments
                .get("expression")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::BadArguments {
                    tool: "calculator".to_string(),
                    reason: "missing string field 'expression'".to_string(),
                })?;
            evaluate(expression)
        }),
    )
}

fn evaluate(expression: &str) -> Result<String, ToolError> {
    match evalexpr::eval(expression) {
        Ok(value) => Ok(value.to_string()),
        Err(e) => Err(ToolError::Execution {
            tool: "calculator".to_string(),
            reason: e.to_string(),
        }),
    }
}
