// src/lib.rs

// Import the top-level `agentmesh` module.
pub mod agentmesh;

// Re-exporting key items for easier external access.
pub use agentmesh::agent::{Agent, AgentCore};
pub use agentmesh::context::Context;
pub use agentmesh::llm::{ChatMessage, ChatRole, LlmClient};
pub use agentmesh::message::{AgentEvent, Message, MessageType};
pub use agentmesh::registry::{Registry, RegistryConfig};
pub use agentmesh::tool::Tool;
pub use agentmesh::transport::MessageTransport;
