//! In-process broker transport.
//!
//! A process-wide queue directory maps logical addresses to channel senders.
//! Each started [`LocalTransport`] registers on its address and spawns a
//! single dispatch task that decodes inbound frames and invokes the
//! receiver's callbacks one at a time, so callbacks for one agent are
//! serialized while different agents dispatch concurrently.
//!
//! Queues support competing consumers: when several transports bind the same
//! address, frames are distributed round-robin in subscription order,
//! mirroring how a message broker load-balances a shared queue.
//!
//! This backend is the minimal broker substitute used by the test suite and
//! by single-process deployments; its semantics (per-pair ordering, best
//! effort delivery, drain-on-stop) deliberately match the STOMP backend.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use lazy_static::lazy_static;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{FrameKind, MessageTransport, TransportError, TransportReceiver};
use crate::agentmesh::message::{AgentEvent, Message};

/// A frame in flight inside the process: the kind header plus the encoded
/// message body, exactly what a wire transport would carry.
struct LocalFrame {
    kind: FrameKind,
    body: String,
}

/// The consumers bound to one queue, with the round-robin cursor.
#[derive(Default)]
struct QueueEntry {
    consumers: Vec<(u64, mpsc::UnboundedSender<LocalFrame>)>,
    next: usize,
}

/// Process-wide directory of live local queues.
struct LocalBroker {
    queues: StdMutex<HashMap<String, QueueEntry>>,
    next_consumer_id: StdMutex<u64>,
}

impl LocalBroker {
    fn new() -> Self {
        Self {
            queues: StdMutex::new(HashMap::new()),
            next_consumer_id: StdMutex::new(0),
        }
    }

    /// Bind a consumer to `address`; returns its id for unbinding.
    fn register(&self, address: &str, sender: mpsc::UnboundedSender<LocalFrame>) -> u64 {
        let id = {
            let mut next = self.next_consumer_id.lock().expect("local broker poisoned");
            *next += 1;
            *next
        };
        let mut queues = self.queues.lock().expect("local broker poisoned");
        queues
            .entry(address.to_string())
            .or_default()
            .consumers
            .push((id, sender));
        id
    }

    fn unregister(&self, address: &str, consumer_id: u64) {
        let mut queues = self.queues.lock().expect("local broker poisoned");
        if let Some(entry) = queues.get_mut(address) {
            entry.consumers.retain(|(id, _)| *id != consumer_id);
            entry.next = 0;
            if entry.consumers.is_empty() {
                queues.remove(address);
            }
        }
    }

    /// The next consumer of `address` in round-robin order.
    fn sender_for(&self, address: &str) -> Option<mpsc::UnboundedSender<LocalFrame>> {
        let mut queues = self.queues.lock().expect("local broker poisoned");
        let entry = queues.get_mut(address)?;
        if entry.consumers.is_empty() {
            return None;
        }
        let index = entry.next % entry.consumers.len();
        entry.next = (index + 1) % entry.consumers.len();
        Some(entry.consumers[index].1.clone())
    }
}

lazy_static! {
    static ref BROKER: LocalBroker = LocalBroker::new();
}

struct LocalState {
    consumer_id: u64,
    dispatcher: JoinHandle<()>,
}

/// An in-process transport bound to one logical address.
pub struct LocalTransport {
    address: String,
    state: Mutex<Option<LocalState>>,
}

impl LocalTransport {
    /// Create a transport for the given queue name. Nothing is registered
    /// until [`MessageTransport::start`] is called.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(None),
        }
    }

    fn deliver(
        &self,
        kind: FrameKind,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError> {
        let sender = BROKER
            .sender_for(destination)
            .ok_or_else(|| TransportError::Send {
                destination: destination.to_string(),
                reason: "no such queue".to_string(),
            })?;
        let body = message.to_wire().map_err(|e| TransportError::Send {
            destination: destination.to_string(),
            reason: format!("encode failed: {}", e),
        })?;
        sender
            .send(LocalFrame { kind, body })
            .map_err(|_| TransportError::Send {
                destination: destination.to_string(),
                reason: "queue closed".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl MessageTransport for LocalTransport {
    fn address(&self) -> &str {
        &self.address
    }

    async fn start(
        &self,
        receiver: std::sync::Arc<dyn TransportReceiver>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(TransportError::Connect(format!(
                "transport for '{}' already started",
                self.address
            )));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<LocalFrame>();
        let consumer_id = BROKER.register(&self.address, tx);

        let address = self.address.clone();
        let dispatcher = tokio::spawn(async move {
            receiver
                .on_event(AgentEvent::Connected {
                    address: address.clone(),
                })
                .await;
            // One frame at a time: callbacks for this agent are serialized.
            while let Some(frame) = rx.recv().await {
                match Message::from_wire(&frame.body) {
                    Ok(message) => match frame.kind {
                        FrameKind::Request => receiver.on_request(message).await,
                        FrameKind::Response => receiver.on_response(message).await,
                    },
                    Err(e) => {
                        log::warn!("[{}] dropping undecodable frame: {}", address, e);
                        receiver
                            .on_error(TransportError::Decode(e.to_string()))
                            .await;
                    }
                }
            }
        });
        *state = Some(LocalState {
            consumer_id,
            dispatcher,
        });
        Ok(())
    }

    async fn send_request(
        &self,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError> {
        self.deliver(FrameKind::Request, message, destination)
    }

    async fn send_response(
        &self,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError> {
        self.deliver(FrameKind::Response, message, destination)
    }

    async fn stop(&self) {
        let state = {
            let mut state = self.state.lock().await;
            state.take()
        };
        if let Some(state) = state {
            // Unbinding drops this consumer's sender; the dispatch task
            // drains whatever was already enqueued and then exits.
            BROKER.unregister(&self.address, state.consumer_id);
            if let Err(e) = state.dispatcher.await {
                log::warn!("[{}] dispatch task ended abnormally: {}", self.address, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::agentmesh::message::MessageType;

    #[derive(Default)]
    struct Recorder {
        requests: AsyncMutex<Vec<Message>>,
        responses: AsyncMutex<Vec<Message>>,
        errors: AsyncMutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl TransportReceiver for Recorder {
        async fn on_request(&self, message: Message) {
            self.requests.lock().await.push(message);
        }
        async fn on_response(&self, message: Message) {
            self.responses.lock().await.push(message);
        }
        async fn on_event(&self, _event: AgentEvent) {}
        async fn on_error(&self, error: TransportError) {
            self.errors.lock().await.push(error.to_string());
        }
    }

    #[tokio::test]
    async fn request_and_response_frames_reach_matching_callbacks() {
        let a = LocalTransport::new("local-test-a");
        let b = LocalTransport::new("local-test-b");
        let recorder_a = Arc::new(Recorder::default());
        let recorder_b = Arc::new(Recorder::default());
        a.start(recorder_a.clone()).await.unwrap();
        b.start(recorder_b.clone()).await.unwrap();

        let query = Message::new("ping").with_message_type(MessageType::Query);
        a.send_request(&query, "local-test-b").await.unwrap();
        let reply = Message::new("pong").with_message_type(MessageType::Response);
        b.send_response(&reply, "local-test-a").await.unwrap();

        a.stop().await;
        b.stop().await;

        assert_eq!(recorder_b.requests.lock().await.len(), 1);
        assert_eq!(recorder_b.requests.lock().await[0].payload, "ping");
        assert_eq!(recorder_a.responses.lock().await.len(), 1);
        assert_eq!(recorder_a.responses.lock().await[0].payload, "pong");
    }

    #[tokio::test]
    async fn sending_to_an_unbound_queue_fails() {
        let t = LocalTransport::new("local-test-lonely");
        let err = t
            .send_request(&Message::new("x"), "local-test-nowhere")
            .await
            .expect_err("should fail");
        assert!(matches!(err, TransportError::Send { .. }));
    }

    #[tokio::test]
    async fn stop_drains_frames_already_enqueued() {
        let t = LocalTransport::new("local-test-drain");
        let recorder = Arc::new(Recorder::default());
        t.start(recorder.clone()).await.unwrap();

        for i in 0..16 {
            t.send_request(&Message::new(format!("m{}", i)), "local-test-drain")
                .await
                .unwrap();
        }
        t.stop().await;

        let requests = recorder.requests.lock().await;
        assert_eq!(requests.len(), 16);
        assert_eq!(requests[15].payload, "m15");
    }

    #[tokio::test]
    async fn competing_consumers_share_a_queue_round_robin() {
        let first = LocalTransport::new("local-test-shared");
        let second = LocalTransport::new("local-test-shared");
        let recorder_first = Arc::new(Recorder::default());
        let recorder_second = Arc::new(Recorder::default());
        first.start(recorder_first.clone()).await.unwrap();
        second.start(recorder_second.clone()).await.unwrap();

        let producer = LocalTransport::new("local-test-producer");
        producer.start(Arc::new(Recorder::default())).await.unwrap();
        for i in 0..4 {
            producer
                .send_request(&Message::new(format!("m{}", i)), "local-test-shared")
                .await
                .unwrap();
        }

        first.stop().await;
        second.stop().await;
        producer.stop().await;

        let first_seen = recorder_first.requests.lock().await;
        let second_seen = recorder_second.requests.lock().await;
        assert_eq!(first_seen.len(), 2);
        assert_eq!(second_seen.len(), 2);
        assert_eq!(first_seen[0].payload, "m0");
        assert_eq!(second_seen[0].payload, "m1");
    }
}
