//! One-question chat over the in-process broker.
//!
//! Loads an LLM answerer (backed by an OpenAI-compatible endpoint) from a
//! declarative document, bridges to it through a pass-through client, then
//! sends one question and prints the correlated answer.
//!
//! Usage:
//!   OPENAI_API_KEY=sk-... cargo run --example local_chat -- "What is Rust?"

use std::sync::Arc;
use std::time::Duration;

use agentmesh::agentmesh::agent::{start_agent, stop_agent};
use agentmesh::agentmesh::agents::PassThroughClientAgent;
use agentmesh::agentmesh::config::AgentLoader;
use agentmesh::agentmesh::correlator::ResponseCorrelator;
use agentmesh::agentmesh::transport::local::LocalTransport;
use agentmesh::{Agent, Message, Registry};

const AGENTS: &str = r#"[
    {"kind": "llm_only", "name": "Answerer",
     "description": "Answers questions with its LLM",
     "llm": {"model": "gpt-4o-mini", "base_url": "https://api.openai.com/v1",
             "api_key_env": "OPENAI_API_KEY"}}
]"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What is the capital of France?".to_string());

    let registry = Arc::new(Registry::new());
    let agents = AgentLoader::new(registry.clone()).load_agents(AGENTS).await?;

    let client = Arc::new(
        PassThroughClientAgent::new(
            "Client",
            "Bridges the caller to the answerer",
            "Answerer",
            Arc::new(LocalTransport::new("Client")),
            registry.clone(),
        )
        .await?,
    );
    let correlator = Arc::new(ResponseCorrelator::new());
    let completing = correlator.clone();
    client.set_response_delivery(Box::new(move |message| {
        completing.complete(message);
    }));
    start_agent(client.clone()).await?;

    let receiver = correlator.register("demo-chat");
    client
        .core()
        .send_request(
            Message::new(question.clone()).with_chat_id("demo-chat"),
            "Answerer",
        )
        .await?;

    match correlator.wait(receiver, Duration::from_secs(60)).await {
        Some(answer) => println!("Q: {}\nA: {}", question, answer.payload),
        None => eprintln!("no answer within 60s"),
    }

    stop_agent(client.as_ref()).await;
    for agent in &agents {
        stop_agent(agent.as_ref()).await;
    }
    Ok(())
}
