//! Narrow contract for the LLM collaborator.
//!
//! The runtime never talks to a model vendor directly; it consumes exactly
//! two operations: a one-shot prompt and a chat completion over an explicit
//! role-tagged history with optional tool schemas. Anything that can satisfy
//! those two calls, whether a remote OpenAI-compatible endpoint (see
//! [`crate::agentmesh::clients::remote::RemoteLlmClient`]) or a hand-rolled
//! stub in tests, plugs in behind [`LlmClient`].
//!
//! Chat histories are stored inside [`Context`](crate::Context)s (and may be
//! serialized into a shared store), so [`ChatMessage`] is a plain serde
//! value type rather than a vendor SDK struct.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The role attached to a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Primes or constrains assistant behavior.
    System,
    /// End-user (or requesting agent) input.
    User,
    /// Model output, possibly carrying tool calls.
    Assistant,
    /// The result of a tool invocation, correlated by `tool_call_id`.
    Tool,
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON string exactly as the model produced it;
/// decoding (and rejecting malformed JSON) is the caller's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    /// Provider-assigned call id used to correlate the tool result turn.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Raw JSON arguments string.
    pub arguments: String,
}

/// One turn of a chat completion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls requested by an assistant turn; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<LlmToolCall>,
    /// For `Tool` turns, the id of the call this turn answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `Tool` turns, the name of the tool (or tool agent) that produced
    /// the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// A tool-result turn answering the call identified by `tool_call_id`.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// Errors surfaced by an LLM client.
#[derive(Debug)]
pub enum LlmError {
    /// The request never produced a usable response (network, HTTP status,
    /// provider-side failure).
    Transport(String),
    /// The response arrived but could not be decoded into the expected
    /// shape.
    MalformedResponse(String),
    /// The model was asked for structured output and did not comply.
    UnparseableOutput(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Transport(reason) => write!(f, "llm request failed: {}", reason),
            LlmError::MalformedResponse(reason) => {
                write!(f, "llm response malformed: {}", reason)
            }
            LlmError::UnparseableOutput(reason) => {
                write!(f, "llm structured output unparseable: {}", reason)
            }
        }
    }
}

impl Error for LlmError {}

/// Request/response capability producing text or tool-call structures.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a single free-standing prompt. The returned message is an
    /// assistant turn.
    async fn process_single_prompt(&self, prompt: &str) -> Result<ChatMessage, LlmError>;

    /// Complete a chat over an explicit history. `tools` carries
    /// LLM-consumable tool schemas (empty slice when no tools are offered);
    /// the returned assistant turn may carry [`LlmToolCall`]s.
    async fn process_chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError>;

    /// The system message this client was configured with, if any. Agents
    /// seed new chats with it unless they carry their own.
    fn system_message(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_messages_round_trip_through_json() {
        let turn = ChatMessage {
            role: ChatRole::Assistant,
            content: "".to_string(),
            tool_calls: vec![LlmToolCall {
                id: "call_1".to_string(),
                name: "add".to_string(),
                arguments: r#"{"a":2,"b":3}"#.to_string(),
            }],
            tool_call_id: None,
            name: None,
        };
        let json = serde_json::to_string(&turn).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn tool_turns_carry_correlation_fields() {
        let turn = ChatMessage::tool("call_1", "add", "5");
        assert_eq!(turn.role, ChatRole::Tool);
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(turn.name.as_deref(), Some("add"));
    }
}
