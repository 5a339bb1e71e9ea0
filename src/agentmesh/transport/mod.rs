//! Message transport abstraction.
//!
//! Every agent owns one transport bound to its own logical address (a queue
//! name). Outbound sends are non-blocking from the caller's perspective;
//! delivery is best-effort with ordering preserved per (sender, destination)
//! pair. Inbound frames are decoded into [`Message`]s and dispatched to a
//! [`TransportReceiver`], whose four callbacks mirror the frame's semantic
//! kind: request, response, broker event, or error.
//!
//! Two backends are provided:
//!
//! - [`local::LocalTransport`]: an in-process broker used by tests and
//!   single-process deployments.
//! - [`stomp::StompTransport`]: a STOMP 1.2 client speaking to a real
//!   message broker over TCP.
//!
//! # Contract
//!
//! - `start` wires the receiver and begins delivery; connect or
//!   authentication failures are fatal to the owning agent and surfaced.
//! - `send_request` / `send_response` differ only in the frame kind header
//!   carried on the wire; the receiver uses it to pick the callback.
//! - `stop` drains any in-flight dispatch before returning: callbacks in
//!   progress complete, no new callbacks fire afterwards.
//! - Send failures on an established connection are logged and delivered to
//!   `on_error`; the transport neither retries nor buffers beyond the
//!   broker's own behavior. Decode failures surface a structured error to
//!   `on_error` without terminating the transport.

pub mod local;
pub mod stomp;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agentmesh::message::{AgentEvent, Message};

/// Distinguishes the two frame kinds carried on the wire.
///
/// The kind travels in a single transport header; everything else about a
/// request and a response frame is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
}

impl FrameKind {
    /// The header value used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Request => "request",
            FrameKind::Response => "response",
        }
    }

    /// Parse a wire header value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request" => Some(FrameKind::Request),
            "response" => Some(FrameKind::Response),
            _ => None,
        }
    }
}

/// Errors produced by a transport.
#[derive(Debug)]
pub enum TransportError {
    /// Connecting to the broker failed during `start`. Fatal to the agent.
    Connect(String),
    /// The broker rejected the credentials during `start`. Fatal.
    Auth(String),
    /// A send on an established connection failed.
    Send {
        /// Destination address the frame was bound for.
        destination: String,
        /// Human-readable reason.
        reason: String,
    },
    /// An inbound frame could not be decoded into a [`Message`].
    Decode(String),
    /// The broker reported an error out of band (e.g. a STOMP ERROR frame).
    Broker(String),
    /// The transport is not started or already stopped.
    NotStarted,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connect(reason) => write!(f, "broker connect failed: {}", reason),
            TransportError::Auth(reason) => write!(f, "broker authentication failed: {}", reason),
            TransportError::Send {
                destination,
                reason,
            } => write!(f, "send to '{}' failed: {}", destination, reason),
            TransportError::Decode(reason) => write!(f, "inbound frame decode failed: {}", reason),
            TransportError::Broker(reason) => write!(f, "broker error: {}", reason),
            TransportError::NotStarted => write!(f, "transport not started"),
        }
    }
}

impl Error for TransportError {}

/// The four-way callback sink a transport delivers into.
///
/// Implemented by the agent dispatch layer. Within one receiver the
/// callbacks are invoked sequentially: a transport delivers at most one
/// inbound frame at a time to a given receiver.
#[async_trait]
pub trait TransportReceiver: Send + Sync {
    /// An inbound frame whose kind header said "request".
    async fn on_request(&self, message: Message);
    /// An inbound frame whose kind header said "response".
    async fn on_response(&self, message: Message);
    /// An out-of-band broker signal.
    async fn on_event(&self, event: AgentEvent);
    /// A transport-level failure (send, decode, connection loss).
    async fn on_error(&self, error: TransportError);
}

/// A polymorphic asynchronous message channel bound to one logical address.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// The logical address (queue name) this transport listens on.
    fn address(&self) -> &str;

    /// Connect and begin delivering inbound frames to `receiver`.
    async fn start(&self, receiver: Arc<dyn TransportReceiver>) -> Result<(), TransportError>;

    /// Send a request frame to the agent listening on `destination`.
    async fn send_request(
        &self,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError>;

    /// Send a response frame to the agent listening on `destination`.
    async fn send_response(
        &self,
        message: &Message,
        destination: &str,
    ) -> Result<(), TransportError>;

    /// Stop the transport, draining in-flight dispatch before returning.
    async fn stop(&self);
}
