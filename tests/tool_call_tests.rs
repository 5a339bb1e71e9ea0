//! The tool invocation protocol: direct tools, agent-backed tools, and its
//! failure modes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agentmesh::agentmesh::agent::{start_agent, stop_agent};
use agentmesh::agentmesh::agents::LlmWithToolsAgent;
use agentmesh::agentmesh::llm::{LlmError, LlmToolCall};
use agentmesh::agentmesh::transport::local::LocalTransport;
use agentmesh::{Agent, AgentCore, ChatMessage, LlmClient, Message, Registry, Tool};

/// Pops one canned reply per completion call.
struct ScriptedClient {
    replies: Mutex<VecDeque<ChatMessage>>,
}

impl ScriptedClient {
    fn new(replies: Vec<ChatMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    fn next_reply(&self) -> Result<ChatMessage, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn process_single_prompt(&self, _prompt: &str) -> Result<ChatMessage, LlmError> {
        self.next_reply()
    }

    async fn process_chat_completion(
        &self,
        _messages: &[ChatMessage],
        _tools: &[serde_json::Value],
    ) -> Result<ChatMessage, LlmError> {
        self.next_reply()
    }
}

fn assistant_with_tool_call(id: &str, name: &str, arguments: &str) -> ChatMessage {
    ChatMessage {
        role: agentmesh::ChatRole::Assistant,
        content: String::new(),
        tool_calls: vec![LlmToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        tool_call_id: None,
        name: None,
    }
}

struct RecorderAgent {
    core: AgentCore,
    responses: Mutex<Vec<Message>>,
}

impl RecorderAgent {
    async fn new(name: &str, registry: Arc<Registry>) -> Arc<Self> {
        let transport = Arc::new(LocalTransport::new(name));
        let core = AgentCore::new(name, "records responses", transport, registry)
            .await
            .expect("register");
        Arc::new(Self {
            core,
            responses: Mutex::new(Vec::new()),
        })
    }

    fn responses(&self) -> Vec<Message> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for RecorderAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        _request: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

/// A tool agent: answers each request with `echo:<arguments>`, copying the
/// correlation fields back so the caller can complete its chat.
struct EchoToolAgent {
    core: AgentCore,
}

impl EchoToolAgent {
    async fn new(name: &str, registry: Arc<Registry>) -> Arc<Self> {
        let transport = Arc::new(LocalTransport::new(name));
        let core = AgentCore::new(name, "echoes tool arguments", transport, registry)
            .await
            .expect("register");
        Arc::new(Self { core })
    }
}

#[async_trait]
impl Agent for EchoToolAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let requester = request.sender.clone().expect("request has a sender");
        let mut reply = Message::new(format!("echo:{}", request.payload))
            .with_context_name(request.context_name);
        if let Some(chat_id) = request.chat_id {
            reply = reply.with_chat_id(chat_id);
        }
        if let Some(tool_id) = request.tool_id {
            reply = reply.with_tool_id(tool_id);
        }
        if let Some(route) = request.route_response_to {
            reply = reply.with_route_response_to(route);
        }
        self.core.send_response(reply, &requester).await
    }

    async fn process_response(
        &self,
        _response: Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

fn add_tool() -> Arc<Tool> {
    Arc::new(Tool::callable(
        "add",
        "Adds two numbers",
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"}
            },
            "required": ["a", "b"]
        }),
        Arc::new(|arguments| {
            let a = arguments["a"].as_f64().unwrap_or(0.0);
            let b = arguments["b"].as_f64().unwrap_or(0.0);
            Ok(format!("{}", a + b))
        }),
    ))
}

#[tokio::test]
async fn direct_tool_call_round_trip() {
    let registry = Arc::new(Registry::new());
    registry.register_tool(add_tool()).unwrap();

    let llm = Arc::new(ScriptedClient::new(vec![
        assistant_with_tool_call("call_1", "add", r#"{"a": 2, "b": 3}"#),
        ChatMessage::assistant("5"),
    ]));
    let tools_agent = Arc::new(
        LlmWithToolsAgent::new(
            "AddingAgent",
            "Adds numbers with a tool",
            llm,
            vec!["add".to_string()],
            Arc::new(LocalTransport::new("AddingAgent")),
            registry.clone(),
        )
        .await
        .unwrap(),
    );
    let recorder = RecorderAgent::new("AddingCaller", registry.clone()).await;
    start_agent(tools_agent.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("What is 2 + 3?"), "AddingAgent")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert_eq!(response.payload, "5");

    let chat_id = response.chat_id.expect("reply carries its chat id");
    let context = registry.get_or_create_context("default").await.unwrap();
    assert!(!context.has_chat_completions(&chat_id).await.unwrap());
    assert!(context.required_tool_calls(&chat_id).await.unwrap().is_empty());

    stop_agent(tools_agent.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn agent_backed_tool_completes_on_response() {
    let registry = Arc::new(Registry::new());
    registry
        .register_tool(Arc::new(Tool::agent_backed(
            "EchoToolAgent",
            "Echoes its arguments",
            serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}}
            }),
        )))
        .unwrap();

    let llm = Arc::new(ScriptedClient::new(vec![
        assistant_with_tool_call("call_9", "EchoToolAgent", r#"{"text": "hi"}"#),
        ChatMessage::assistant("done"),
    ]));
    let tools_agent = Arc::new(
        LlmWithToolsAgent::new(
            "DelegatingAgent",
            "Delegates to a tool agent",
            llm,
            vec!["EchoToolAgent".to_string()],
            Arc::new(LocalTransport::new("DelegatingAgent")),
            registry.clone(),
        )
        .await
        .unwrap(),
    );
    let tool_agent = EchoToolAgent::new("EchoToolAgent", registry.clone()).await;
    let recorder = RecorderAgent::new("DelegatingCaller", registry.clone()).await;
    start_agent(tools_agent.clone()).await.unwrap();
    start_agent(tool_agent.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("ask the echo"), "DelegatingAgent")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert_eq!(response.payload, "done");

    // The tool turn was keyed by the original call and the pending multiset
    // drained before the final completion.
    let chat_id = response.chat_id.expect("reply carries its chat id");
    let context = registry.get_or_create_context("default").await.unwrap();
    assert!(context.required_tool_calls(&chat_id).await.unwrap().is_empty());
    assert!(!context.has_chat_completions(&chat_id).await.unwrap());

    stop_agent(tools_agent.as_ref()).await;
    stop_agent(tool_agent.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn unknown_tool_name_is_reported_to_the_requester() {
    let registry = Arc::new(Registry::new());
    let llm = Arc::new(ScriptedClient::new(vec![ChatMessage::assistant("unused")]));
    let tools_agent = Arc::new(
        LlmWithToolsAgent::new(
            "MisconfiguredAgent",
            "Offers a tool nobody registered",
            llm,
            vec!["ghost".to_string()],
            Arc::new(LocalTransport::new("MisconfiguredAgent")),
            registry.clone(),
        )
        .await
        .unwrap(),
    );
    let recorder = RecorderAgent::new("MisconfiguredCaller", registry.clone()).await;
    start_agent(tools_agent.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("anything"), "MisconfiguredAgent")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert!(response.payload.contains("unknown tool 'ghost'"));

    stop_agent(tools_agent.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}

#[tokio::test]
async fn malformed_tool_arguments_are_reported_to_the_requester() {
    let registry = Arc::new(Registry::new());
    registry.register_tool(add_tool()).unwrap();

    let llm = Arc::new(ScriptedClient::new(vec![assistant_with_tool_call(
        "call_2", "add", "{not json",
    )]));
    let tools_agent = Arc::new(
        LlmWithToolsAgent::new(
            "GarbledAgent",
            "Receives malformed tool arguments",
            llm,
            vec!["add".to_string()],
            Arc::new(LocalTransport::new("GarbledAgent")),
            registry.clone(),
        )
        .await
        .unwrap(),
    );
    let recorder = RecorderAgent::new("GarbledCaller", registry.clone()).await;
    start_agent(tools_agent.clone()).await.unwrap();
    start_agent(recorder.clone()).await.unwrap();

    recorder
        .core()
        .send_request(Message::new("anything"), "GarbledAgent")
        .await
        .unwrap();
    wait_for(|| !recorder.responses().is_empty()).await;

    let response = recorder.responses().remove(0);
    assert!(response.payload.contains("bad arguments for tool 'add'"));

    stop_agent(tools_agent.as_ref()).await;
    stop_agent(recorder.as_ref()).await;
}
