//! Agent interface and shared dispatch core.
//!
//! An agent is a named, addressable, independently dispatching unit. The
//! variable behavior lives in the [`Agent`] trait's four hooks, one per
//! transport callback, with one concrete implementation per agent kind (see
//! [`crate::agentmesh::agents`]). The invariant behavior lives in
//! [`AgentCore`], which every kind embeds:
//!
//! - registration in the [`Registry`] on construction (fatal failures abort
//!   construction and surface to the caller);
//! - stamping `sender` on outbound messages when the hook left it unset;
//! - appending every outbound message to its context's trace and keeping
//!   the participants set current on both send and delivery;
//! - making sure the context exists before a hook runs.
//!
//! Within one agent, hooks run one at a time (the transport dispatches
//! serially per receiver); across agents they run concurrently. Hooks never
//! wait synchronously for another agent's response: they return, and the
//! reaction happens in `process_response`. That convention is what keeps the
//! coordination protocols deadlock-free.
//!
//! Recoverable hook errors are logged and, when the requester is known,
//! surfaced back to it as a RESPONSE carrying an error payload.

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agentmesh::message::{AgentEvent, Message, MessageType};
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::transport::{MessageTransport, TransportError, TransportReceiver};

/// The per-kind behavior of an agent.
///
/// Implementations hold an [`AgentCore`] and return it from [`Agent::core`];
/// everything else on the trait has sensible defaults for kinds that ignore
/// events or only log errors.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The shared dispatch core this agent embeds.
    fn core(&self) -> &AgentCore;

    /// The agent's unique name (and logical address).
    fn name(&self) -> &str {
        self.core().name()
    }

    /// The agent's human description, used for discovery.
    fn description(&self) -> &str {
        self.core().description()
    }

    /// Handle an inbound request frame.
    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Handle an inbound response frame.
    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Handle an out-of-band broker event. Default: ignore.
    async fn process_event(&self, event: AgentEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("[{}] event: {:?}", self.name(), event);
        Ok(())
    }

    /// Handle a transport-level error. Default: log and continue.
    async fn process_error(
        &self,
        error: TransportError,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::error!("[{}] transport error: {}", self.name(), error);
        Ok(())
    }

    /// Kind-specific cleanup, run by [`stop_agent`] after the transport has
    /// drained and the agent has been unregistered. Default: nothing.
    async fn on_stop(&self) {}
}

/// The shared state and side-effect primitives every agent kind embeds.
pub struct AgentCore {
    name: String,
    description: String,
    transport: Arc<dyn MessageTransport>,
    registry: Arc<Registry>,
}

impl AgentCore {
    /// Create the core and register the agent in the directory. A rejected
    /// name (duplicate, whitespace) aborts construction.
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let description = description.into();
        registry.register_agent(&name, &description).await?;
        Ok(Self {
            name,
            description,
            transport,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    /// Send a request frame to `destination`, stamping `sender` when unset
    /// and recording the message in its context.
    pub async fn send_request(
        &self,
        message: Message,
        destination: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = self.prepare_outbound(message).await?;
        if let Err(e) = self.transport.send_request(&message, destination).await {
            log::error!("[{}] request to '{}' not sent: {}", self.name, destination, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// Send a response frame to `destination`, stamping `sender` when unset
    /// and recording the message in its context.
    pub async fn send_response(
        &self,
        message: Message,
        destination: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = self.prepare_outbound(message).await?;
        if let Err(e) = self.transport.send_response(&message, destination).await {
            log::error!("[{}] response to '{}' not sent: {}", self.name, destination, e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn prepare_outbound(
        &self,
        mut message: Message,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        if message.sender.is_none() {
            message.sender = Some(self.name.clone());
        }
        let context = self
            .registry
            .get_or_create_context(&message.context_name)
            .await?;
        context.record_message(&message).await?;
        context.add_participant(&self.name).await?;
        Ok(message)
    }

    /// Make sure the context named by an inbound message exists and this
    /// agent appears among its participants. Runs before every hook.
    async fn note_inbound(&self, message: &Message) -> Result<(), Box<dyn Error + Send + Sync>> {
        let context = self
            .registry
            .get_or_create_context(&message.context_name)
            .await?;
        context.add_participant(&self.name).await?;
        Ok(())
    }
}

/// Start an agent: wire its transport callbacks to its hooks and begin
/// dispatching. Connect and authentication failures are fatal and returned.
pub async fn start_agent(agent: Arc<dyn Agent>) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport = agent.core().transport().clone();
    let dispatcher = Arc::new(AgentDispatcher {
        agent: agent.clone(),
    });
    transport.start(dispatcher).await?;
    log::info!("[{}] started", agent.name());
    Ok(())
}

/// Stop an agent: stop its transport (draining callbacks in flight),
/// unregister it, then run kind-specific cleanup.
pub async fn stop_agent(agent: &dyn Agent) {
    let core = agent.core();
    core.transport().stop().await;
    if let Err(e) = core.registry().unregister_agent(core.name()).await {
        log::warn!("[{}] unregister failed: {}", core.name(), e);
    }
    agent.on_stop().await;
    log::info!("[{}] stopped", agent.name());
}

/// Adapts the transport's four-way callback sink onto an agent's hooks,
/// applying the shared bookkeeping and error-surfacing policy.
struct AgentDispatcher {
    agent: Arc<dyn Agent>,
}

#[async_trait]
impl TransportReceiver for AgentDispatcher {
    async fn on_request(&self, message: Message) {
        let core = self.agent.core();
        if let Err(e) = core.note_inbound(&message).await {
            log::error!("[{}] context bookkeeping failed: {}", core.name(), e);
        }
        let requester = message.sender.clone();
        let context_name = message.context_name.clone();
        let chat_id = message.chat_id.clone();
        if let Err(e) = self.agent.process_request(message).await {
            log::error!("[{}] request hook failed: {}", core.name(), e);
            // Surface the failure to the requester when we know who asked.
            if let Some(requester) = requester {
                let mut error_reply = Message::new(format!("Error processing request: {}", e))
                    .with_message_type(MessageType::Response)
                    .with_context_name(context_name);
                if let Some(chat_id) = chat_id {
                    error_reply = error_reply.with_chat_id(chat_id);
                }
                if let Err(send_err) = core.send_response(error_reply, &requester).await {
                    log::error!(
                        "[{}] could not deliver error response to '{}': {}",
                        core.name(),
                        requester,
                        send_err
                    );
                }
            }
        }
    }

    async fn on_response(&self, message: Message) {
        let core = self.agent.core();
        if let Err(e) = core.note_inbound(&message).await {
            log::error!("[{}] context bookkeeping failed: {}", core.name(), e);
        }
        if let Err(e) = self.agent.process_response(message).await {
            log::error!("[{}] response hook failed: {}", core.name(), e);
        }
    }

    async fn on_event(&self, event: AgentEvent) {
        if let Err(e) = self.agent.process_event(event).await {
            log::error!("[{}] event hook failed: {}", self.agent.name(), e);
        }
    }

    async fn on_error(&self, error: TransportError) {
        if let Err(e) = self.agent.process_error(error).await {
            log::error!("[{}] error hook failed: {}", self.agent.name(), e);
        }
    }
}
