//! OpenAI-compatible remote LLM client.
//!
//! Speaks the `chat/completions` wire format directly over HTTP, which
//! keeps the [`LlmClient`] contract free of vendor SDK types and works
//! against any compatible server (hosted APIs, vLLM, llama.cpp, LM Studio).
//!
//! # Example
//!
//! ```rust,no_run
//! use agentmesh::agentmesh::clients::remote::RemoteLlmClient;
//! use agentmesh::LlmClient;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RemoteLlmClient::new("https://api.openai.com/v1", "gpt-4o-mini")
//!     .with_api_key(std::env::var("OPENAI_API_KEY")?)
//!     .with_system_message("You are a helpful assistant.");
//!
//! let reply = client.process_single_prompt("Who are you?").await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agentmesh::llm::{ChatMessage, ChatRole, LlmClient, LlmError, LlmToolCall};

// -- wire format -------------------------------------------------------------

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [serde_json::Value]>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn to_wire(message: &ChatMessage) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };
    WireMessage {
        role: role_name(message.role),
        content: message.content.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
        name: message.name.clone(),
    }
}

// -- client ------------------------------------------------------------------

/// An [`LlmClient`] backed by an OpenAI-compatible HTTP endpoint.
pub struct RemoteLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_message: Option<String>,
}

impl RemoteLlmClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    /// targeting `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            system_message: None,
        }
    }

    /// Attach a bearer token for the `Authorization` header.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the system message seeded into new chats.
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// The model identifier requests are issued for.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: Vec<WireMessage>,
        tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        let request = WireRequest {
            model: &self.model,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if log::log_enabled!(log::Level::Error) {
                log::error!(
                    "RemoteLlmClient::complete: HTTP {} from {}: {}",
                    status,
                    self.base_url,
                    body
                );
            }
            return Err(LlmError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let decoded: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        let choice = decoded
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("response carried no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| LlmToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ChatMessage {
            role: ChatRole::Assistant,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
            name: None,
        })
    }
}

#[async_trait]
impl LlmClient for RemoteLlmClient {
    async fn process_single_prompt(&self, prompt: &str) -> Result<ChatMessage, LlmError> {
        let mut messages = Vec::new();
        if let Some(system_message) = &self.system_message {
            messages.push(to_wire(&ChatMessage::system(system_message.clone())));
        }
        messages.push(to_wire(&ChatMessage::user(prompt)));
        self.complete(messages, &[]).await
    }

    async fn process_chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        self.complete(messages.iter().map(to_wire).collect(), tools).await
    }

    fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_serialize_in_function_shape() {
        let turn = ChatMessage {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_calls: vec![LlmToolCall {
                id: "call_1".to_string(),
                name: "add".to_string(),
                arguments: r#"{"a":1}"#.to_string(),
            }],
            tool_call_id: None,
            name: None,
        };
        let wire = serde_json::to_value(to_wire(&turn)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "add");
    }

    #[test]
    fn tool_result_turns_carry_their_correlation_id() {
        let wire = serde_json::to_value(to_wire(&ChatMessage::tool("call_1", "add", "5"))).unwrap();
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
        assert_eq!(wire["name"], "add");
        assert_eq!(wire["content"], "5");
    }

    #[test]
    fn responses_with_tool_calls_decode() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "add", "arguments": "{\"a\":2,\"b\":3}"}
                    }]
                }
            }]
        }"#;
        let decoded: WireResponse = serde_json::from_str(body).unwrap();
        let message = &decoded.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "add");
    }
}
