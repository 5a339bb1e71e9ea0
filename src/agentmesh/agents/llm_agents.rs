//! LLM-backed agents.
//!
//! [`LlmOnlyAgent`] answers each request with a single completion.
//! [`LlmWithToolsAgent`] runs the tool invocation protocol: a chat is an
//! explicit state record in the shared context (history, offered tool
//! schemas, and a multiset of pending tool calls), and one reducer fires
//! the final completion exactly when that multiset empties, whether the
//! last call completed synchronously (direct tool) or via an inbound agent
//! response.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::agentmesh::agent::{Agent, AgentCore};
use crate::agentmesh::context::Context;
use crate::agentmesh::llm::{ChatMessage, LlmClient};
use crate::agentmesh::message::{Message, MessageType};
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::tool::ToolError;
use crate::agentmesh::transport::MessageTransport;

/// Answers every request with one LLM completion.
pub struct LlmOnlyAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
}

impl LlmOnlyAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self { core, llm })
    }
}

#[async_trait]
impl Agent for LlmOnlyAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = match &request.sender {
            Some(sender) => sender.clone(),
            None => return Err("request carried no sender to respond to".into()),
        };
        let reply = self.llm.process_single_prompt(&request.payload).await?;
        let mut response = Message::new(reply.content)
            .with_message_type(MessageType::Response)
            .with_context_name(request.context_name);
        if let Some(chat_id) = request.chat_id {
            response = response.with_chat_id(chat_id);
        }
        self.core.send_response(response, &requester).await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Runs the tool invocation protocol of the framework.
///
/// Per request: seed a fresh chat in the shared context, offer this agent's
/// tool schemas, and complete. Tool calls in the completion are recorded as
/// pending; direct tools execute synchronously and clear immediately,
/// agent-backed tools are invoked by messaging and clear when their response
/// arrives. When the pending multiset empties, one more completion over the
/// enriched history produces the reply, and the chat history is dropped.
pub struct LlmWithToolsAgent {
    core: AgentCore,
    llm: Arc<dyn LlmClient>,
    tools: Vec<String>,
}

impl LlmWithToolsAgent {
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        tools: Vec<String>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self { core, llm, tools })
    }

    /// When the chat has no pending tool calls left, run the final
    /// completion, reply to `respond_to`, and drop the chat history.
    async fn finalize_if_idle(
        &self,
        context: &Arc<Context>,
        chat_id: &str,
        respond_to: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if !context.required_tool_calls(chat_id).await?.is_empty() {
            return Ok(());
        }
        let history = context.chat_completions(chat_id).await?;
        let tools = context.available_tools(chat_id).await?;
        let reply = self.llm.process_chat_completion(&history, &tools).await?;
        log::debug!(
            "[{}] chat {} idle, sending final reply to {}",
            self.name(),
            chat_id,
            respond_to
        );
        let response = Message::new(reply.content)
            .with_message_type(MessageType::Response)
            .with_context_name(context.name().to_string())
            .with_chat_id(chat_id.to_string());
        self.core.send_response(response, respond_to).await?;
        context.drop_chat_completions(chat_id).await?;
        Ok(())
    }
}

#[async_trait]
impl Agent for LlmWithToolsAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let requester = match &request.sender {
            Some(sender) => sender.clone(),
            None => return Err("request carried no sender to respond to".into()),
        };
        let chat_id = Uuid::new_v4().to_string();
        let context = self
            .core
            .registry()
            .get_or_create_context(&request.context_name)
            .await?;

        if let Some(system_message) = self.llm.system_message() {
            context
                .append_chat_completion(&chat_id, ChatMessage::system(system_message))
                .await?;
        }
        context
            .append_chat_completion(&chat_id, ChatMessage::user(request.payload.clone()))
            .await?;
        for tool_name in &self.tools {
            let tool = self
                .core
                .registry()
                .get_tool(tool_name)
                .ok_or_else(|| ToolError::UnknownTool(tool_name.clone()))?;
            context.add_available_tool(&chat_id, tool.schema()).await?;
        }

        let history = context.chat_completions(&chat_id).await?;
        let offered = context.available_tools(&chat_id).await?;
        let reply = self.llm.process_chat_completion(&history, &offered).await?;

        if !reply.tool_calls.is_empty() {
            let calls = reply.tool_calls.clone();
            context.append_chat_completion(&chat_id, reply).await?;
            for call in &calls {
                context
                    .append_required_tool_call(&chat_id, &call.name)
                    .await?;
            }
            for call in &calls {
                let tool = self
                    .core
                    .registry()
                    .get_tool(&call.name)
                    .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
                if tool.is_agent_tool() {
                    // The tool's name doubles as the backing agent's address;
                    // the chat completes when its response arrives.
                    let invocation = Message::new(call.arguments.clone())
                        .with_context_name(request.context_name.clone())
                        .with_chat_id(chat_id.clone())
                        .with_tool_id(call.id.clone())
                        .with_route_response_to(requester.clone());
                    self.core.send_request(invocation, &call.name).await?;
                } else {
                    let arguments = tool.decode_arguments(&call.arguments)?;
                    let output = tool.exec(arguments)?;
                    context
                        .append_chat_completion(
                            &chat_id,
                            ChatMessage::tool(call.id.clone(), call.name.clone(), output),
                        )
                        .await?;
                    context
                        .remove_required_tool_call(&chat_id, &call.name)
                        .await?;
                }
            }
        }

        self.finalize_if_idle(&context, &chat_id, &requester).await
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let chat_id = match &response.chat_id {
            Some(chat_id) => chat_id.clone(),
            None => return Err("tool response carried no chat id".into()),
        };
        let tool_agent = match &response.sender {
            Some(sender) => sender.clone(),
            None => return Err("tool response carried no sender".into()),
        };
        let respond_to = match &response.route_response_to {
            Some(route) => route.clone(),
            None => return Err("tool response carried no response routing".into()),
        };
        let context = self
            .core
            .registry()
            .get_or_create_context(&response.context_name)
            .await?;

        let tool_id = response.tool_id.clone().unwrap_or_default();
        context
            .append_chat_completion(
                &chat_id,
                ChatMessage::tool(tool_id, tool_agent.clone(), response.payload.clone()),
            )
            .await?;
        context
            .remove_required_tool_call(&chat_id, &tool_agent)
            .await?;

        self.finalize_if_idle(&context, &chat_id, &respond_to).await
    }
}
