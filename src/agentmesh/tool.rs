//! Tool descriptors.
//!
//! A [`Tool`] names an external capability the LLM may invoke. Two kinds
//! exist:
//!
//! - **callable**: carries an executor closure run synchronously by the
//!   invoking agent;
//! - **agent-backed**: the tool name doubles as an agent address; the
//!   invoking agent sends the call's arguments as a request and completes
//!   the chat when the tool agent's response arrives.
//!
//! Either way the tool exposes an LLM-consumable schema in the
//! OpenAI-function shape, which is what
//! [`LlmClient::process_chat_completion`](crate::LlmClient) expects in its
//! `tools` slice.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use agentmesh::Tool;
//!
//! let add = Tool::callable(
//!     "add",
//!     "Adds two numbers",
//!     serde_json::json!({
//!         "type": "object",
//!         "properties": {
//!             "a": {"type": "number"},
//!             "b": {"type": "number"}
//!         },
//!         "required": ["a", "b"]
//!     }),
//!     Arc::new(|args| {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(format!("{}", a + b))
//!     }),
//! );
//! assert!(!add.is_agent_tool());
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Executor closure for a directly-callable tool: decoded JSON arguments in,
/// natural-language result out.
pub type ToolExecutor =
    Arc<dyn Fn(serde_json::Value) -> Result<String, ToolError> + Send + Sync>;

/// Errors raised while resolving or executing tools.
#[derive(Debug)]
pub enum ToolError {
    /// The model named a tool nobody registered.
    UnknownTool(String),
    /// The model produced arguments that are not the expected JSON.
    BadArguments {
        tool: String,
        reason: String,
    },
    /// The executor itself failed.
    Execution {
        tool: String,
        reason: String,
    },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::UnknownTool(name) => write!(f, "unknown tool '{}'", name),
            ToolError::BadArguments { tool, reason } => {
                write!(f, "bad arguments for tool '{}': {}", tool, reason)
            }
            ToolError::Execution { tool, reason } => {
                write!(f, "tool '{}' failed: {}", tool, reason)
            }
        }
    }
}

impl Error for ToolError {}

/// A named capability callable by the LLM.
pub struct Tool {
    name: String,
    description: String,
    /// JSON Schema describing the accepted arguments.
    parameters: serde_json::Value,
    /// Present for callable tools, absent for agent-backed ones.
    executor: Option<ToolExecutor>,
}

impl Tool {
    /// Define a directly-callable tool.
    pub fn callable(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            executor: Some(executor),
        }
    }

    /// Define an agent-backed tool. The name must match the backing agent's
    /// address.
    pub fn agent_backed(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            executor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether invocations are delegated to an agent rather than executed
    /// in-process.
    pub fn is_agent_tool(&self) -> bool {
        self.executor.is_none()
    }

    /// The tool's schema in the shape the LLM contract consumes.
    pub fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    /// Run a callable tool with already-decoded arguments.
    ///
    /// Calling this on an agent-backed tool is a usage error and reported as
    /// such.
    pub fn exec(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        match &self.executor {
            Some(executor) => executor(arguments),
            None => Err(ToolError::Execution {
                tool: self.name.clone(),
                reason: "agent-backed tools are invoked by messaging, not executed".to_string(),
            }),
        }
    }

    /// Decode a raw JSON arguments string, mapping failures to
    /// [`ToolError::BadArguments`].
    pub fn decode_arguments(&self, raw: &str) -> Result<serde_json::Value, ToolError> {
        serde_json::from_str(raw).map_err(|e| ToolError::BadArguments {
            tool: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("agent_tool", &self.is_agent_tool())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_in_function_shape() {
        let tool = Tool::agent_backed("WeatherAgent", "Answers weather queries", serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}}
        }));
        let schema = tool.schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "WeatherAgent");
        assert!(tool.is_agent_tool());
    }

    #[test]
    fn callable_tools_execute_and_reject_bad_arguments() {
        let tool = Tool::callable(
            "add",
            "Adds two numbers",
            serde_json::json!({"type": "object"}),
            Arc::new(|args| {
                let a = args["a"].as_f64().unwrap_or(0.0);
                let b = args["b"].as_f64().unwrap_or(0.0);
                Ok(format!("{}", a + b))
            }),
        );
        let args = tool.decode_arguments(r#"{"a":2,"b":3}"#).unwrap();
        assert_eq!(tool.exec(args).unwrap(), "5");

        let err = tool.decode_arguments("{not json").unwrap_err();
        assert!(matches!(err, ToolError::BadArguments { .. }));
    }
}
