//! Message and event types exchanged between agents.
//!
//! A [`Message`] is an immutable value object carrying a natural-language
//! payload plus the routing metadata needed by the collaboration protocols:
//! the sending agent, the multi-turn chat it belongs to, the tool call it
//! correlates with, the shared context it should be recorded in, and an
//! optional agent that the eventual response should be forwarded to.
//!
//! Messages serialize to JSON for the transport's text framing; the framing
//! is symmetric, so `Message::from_wire(&m.to_wire()?)` reproduces `m`
//! field-for-field.
//!
//! # Example
//!
//! ```rust
//! use agentmesh::{Message, MessageType};
//!
//! let msg = Message::new("What is the tallest mountain?")
//!     .with_sender("Client")
//!     .with_message_type(MessageType::Query)
//!     .with_chat_id("chat-1");
//!
//! let wire = msg.to_wire().unwrap();
//! assert_eq!(Message::from_wire(&wire).unwrap(), msg);
//! ```

use serde::{Deserialize, Serialize};

/// The semantic kind of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A minimal response indicating a collaborator has finished its work
    /// and updated the shared chat history.
    Ack,
    /// An out-of-band notification.
    Alert,
    /// A terminal response indicating the query could not be answered.
    CannotAnswer,
    /// A request for work.
    Query,
    /// An answer to a previous QUERY.
    Response,
    /// A request to perform a concrete action.
    ActionRequest,
    /// A message authored directly by a human.
    Human,
}

fn default_context_name() -> String {
    "default".to_string()
}

/// An immutable message exchanged between agents.
///
/// Construction goes through [`Message::new`] plus the `with_*` builder
/// methods; once handed to a transport the message is never mutated (the
/// dispatch layer stamps `sender` before sending when the caller left it
/// unset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The message contents, a natural-language string.
    pub payload: String,
    /// The name of the sending agent, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// The semantic kind of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// Correlates the message with a multi-turn chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Correlates the message with an outstanding tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    /// The shared context this message is recorded in. Defaults to
    /// `"default"`.
    #[serde(default = "default_context_name")]
    pub context_name: String,
    /// The agent an eventual response should be forwarded to, when the
    /// immediate sender is acting on behalf of someone else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_response_to: Option<String>,
}

impl Message {
    /// Create a message with the given payload and the `"default"` context.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            sender: None,
            message_type: None,
            chat_id: None,
            tool_id: None,
            context_name: default_context_name(),
            route_response_to: None,
        }
    }

    /// Set the sending agent's name.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Set the semantic kind of the message.
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Set the chat correlation id.
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Set the tool call correlation id.
    pub fn with_tool_id(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = Some(tool_id.into());
        self
    }

    /// Record the message in the named context instead of `"default"`.
    pub fn with_context_name(mut self, context_name: impl Into<String>) -> Self {
        self.context_name = context_name.into();
        self
    }

    /// Name the agent an eventual response should be forwarded to.
    pub fn with_route_response_to(mut self, agent_name: impl Into<String>) -> Self {
        self.route_response_to = Some(agent_name.into());
        self
    }

    /// Serialize the message for the transport's text framing.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a message from the transport's text framing.
    pub fn from_wire(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// An out-of-band signal from the broker, delivered to an agent's
/// `process_event` hook. These are lifecycle notifications, not agent
/// traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The transport established its connection and subscription.
    Connected {
        /// The logical address (queue name) that is now live.
        address: String,
    },
    /// The transport lost its connection.
    Disconnected {
        /// The logical address that went dark.
        address: String,
        /// Human-readable reason, e.g. "connection reset".
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_preserves_every_field() {
        let msg = Message::new("hello")
            .with_sender("Agent1")
            .with_message_type(MessageType::Query)
            .with_chat_id("c-1")
            .with_tool_id("t-9")
            .with_context_name("weather")
            .with_route_response_to("Client");

        let wire = msg.to_wire().expect("serialize");
        let back = Message::from_wire(&wire).expect("deserialize");
        assert_eq!(back, msg);
    }

    #[test]
    fn context_name_defaults_when_absent_from_wire() {
        let back = Message::from_wire(r#"{"payload":"hi"}"#).expect("deserialize");
        assert_eq!(back.context_name, "default");
        assert!(back.sender.is_none());
        assert!(back.message_type.is_none());
    }

    #[test]
    fn message_type_uses_upper_snake_framing() {
        let msg = Message::new("").with_message_type(MessageType::CannotAnswer);
        let wire = msg.to_wire().unwrap();
        assert!(wire.contains("CANNOT_ANSWER"));
    }
}
