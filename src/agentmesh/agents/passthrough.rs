//! Pass-through client agent.
//!
//! Bridges code that lives outside the mesh (a shell, a test harness) to a
//! downstream agent: every request is forwarded verbatim to the configured
//! destination, and the matching response is handed to an injected delivery
//! callback, typically one that completes a
//! [`ResponseCorrelator`](crate::agentmesh::correlator::ResponseCorrelator)
//! registration.

use std::error::Error;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;

use crate::agentmesh::agent::{Agent, AgentCore};
use crate::agentmesh::message::Message;
use crate::agentmesh::registry::{Registry, RegistryError};
use crate::agentmesh::transport::MessageTransport;

/// Callback invoked with each response the pass-through receives.
pub type ResponseDelivery = Box<dyn Fn(Message) + Send + Sync>;

/// Forwards requests to one downstream agent and responses to a callback.
pub struct PassThroughClientAgent {
    core: AgentCore,
    destination: String,
    response_delivery: StdMutex<Option<ResponseDelivery>>,
}

impl PassThroughClientAgent {
    /// Create and register the agent. `destination` names the downstream
    /// agent every request is forwarded to.
    pub async fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        destination: impl Into<String>,
        transport: Arc<dyn MessageTransport>,
        registry: Arc<Registry>,
    ) -> Result<Self, RegistryError> {
        let core = AgentCore::new(name, description, transport, registry).await?;
        Ok(Self {
            core,
            destination: destination.into(),
            response_delivery: StdMutex::new(None),
        })
    }

    /// Install the function that receives responses.
    pub fn set_response_delivery(&self, delivery: ResponseDelivery) {
        *self
            .response_delivery
            .lock()
            .expect("response delivery poisoned") = Some(delivery);
    }
}

#[async_trait]
impl Agent for PassThroughClientAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn process_request(
        &self,
        request: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut forwarded = Message::new(request.payload)
            .with_context_name(request.context_name);
        if let Some(chat_id) = request.chat_id {
            forwarded = forwarded.with_chat_id(chat_id);
        }
        self.core.send_request(forwarded, &self.destination).await
    }

    async fn process_response(
        &self,
        response: Message,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let delivery = self
            .response_delivery
            .lock()
            .expect("response delivery poisoned");
        match delivery.as_ref() {
            Some(deliver) => {
                deliver(response);
                Ok(())
            }
            None => {
                log::warn!(
                    "[{}] response received but no delivery callback is installed",
                    self.name()
                );
                Ok(())
            }
        }
    }
}
