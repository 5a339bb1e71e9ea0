//! Request/response correlation for external callers.
//!
//! Code outside the agent mesh (a shell, an HTTP handler, a test) injects a
//! request through a [`PassThroughClientAgent`](crate::agentmesh::agents::passthrough::PassThroughClientAgent)
//! and needs to wait for the matching response. The [`ResponseCorrelator`]
//! makes that explicit: register interest under a `chat_id` before sending,
//! then await the handle; the pass-through agent's delivery callback
//! completes it. Responses carrying no `chat_id` complete the registration
//! made under [`ResponseCorrelator::UNKEYED`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::agentmesh::message::Message;

/// Waits for responses keyed by chat id.
#[derive(Default)]
pub struct ResponseCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

impl ResponseCorrelator {
    /// Key used for responses that carry no `chat_id`.
    pub const UNKEYED: &'static str = "";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the response for `chat_id`. A second
    /// registration under the same key replaces the first (which will then
    /// never complete).
    pub fn register(&self, chat_id: &str) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("correlator poisoned")
            .insert(chat_id.to_string(), tx);
        rx
    }

    /// Complete the registration matching `message.chat_id`. Returns `false`
    /// when nobody was waiting.
    pub fn complete(&self, message: Message) -> bool {
        let key = message
            .chat_id
            .clone()
            .unwrap_or_else(|| Self::UNKEYED.to_string());
        let sender = self
            .pending
            .lock()
            .expect("correlator poisoned")
            .remove(&key);
        match sender {
            Some(sender) => sender.send(message).is_ok(),
            None => {
                log::warn!("no caller waiting for response with chat id '{}'", key);
                false
            }
        }
    }

    /// Await a registered response with a deadline.
    pub async fn wait(
        &self,
        receiver: oneshot::Receiver<Message>,
        timeout: Duration,
    ) -> Option<Message> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(_)) => None,
            Err(_) => None,
        }
    }
}
