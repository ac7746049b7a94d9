//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Keepalive frames are bare
//! strings, not JSON, and are matched before any parsing is attempted.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Application-level keepalive probe, sent as a bare text frame
pub const PING: &str = "ping";
/// Reply to [`PING`], also a bare text frame
pub const PONG: &str = "pong";

/// Client → Server event
///
/// Structured events from client to server. Tagged by `type` with a
/// kind-specific `payload` object.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    /// Attach this connection to a room under a display name
    Join { payload: JoinRequest },
    /// Send a chat message to a room
    Chat { payload: ChatSend },
    /// Signal typing state to a room
    Typing { payload: TypingSend },
}

/// Payload of an inbound join
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: String,
    pub name: String,
}

/// Payload of an inbound chat message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
    pub room_id: String,
    pub sender: String,
    pub message: String,
}

/// Payload of an inbound typing indicator
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSend {
    pub room_id: String,
    pub sender: String,
    pub is_typing: bool,
}

/// Server → Client event
///
/// Structured events from server to client. Field names and nesting are the
/// wire contract; there is no protocol versioning.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Someone joined the room (sent to every member, joiner included)
    #[serde(rename_all = "camelCase")]
    Join {
        message: String,
        count: usize,
        new_user: String,
    },
    /// Chat message delivery
    Chat { payload: ChatDeliver },
    /// Typing indicator delivery
    Typing { payload: TypingDeliver },
    /// A member left the room (sent to the remaining members)
    Left { payload: LeftNotice },
    /// Fatal protocol error, sent once before the connection is closed
    Error { message: String },
}

/// Payload of an outbound chat delivery
#[derive(Debug, Clone, Serialize)]
pub struct ChatDeliver {
    pub sender: String,
    pub message: String,
}

/// Payload of an outbound typing indicator (room id is implied by fan-out)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingDeliver {
    pub sender: String,
    pub is_typing: bool,
}

/// Payload of an outbound leave notice
#[derive(Debug, Clone, Serialize)]
pub struct LeftNotice {
    pub message: String,
    pub count: usize,
}

impl ServerEvent {
    /// Serialize to the wire representation
    pub fn encode(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One decoded inbound text frame
#[derive(Debug)]
pub enum InboundFrame {
    /// Keepalive probe; answer with a bare `"pong"`
    Ping,
    /// Keepalive reply; log and ignore
    Pong,
    /// Structured client event
    Event(ClientEvent),
}

/// One outbound frame queued to a connection's writer task
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// Structured server event, serialized at write time
    Event(ServerEvent),
    /// Bare `"pong"` keepalive reply
    Pong,
}

/// Decode an inbound text frame
///
/// Keepalive strings short-circuit before the JSON parser runs, so they can
/// never be mistaken for (or rejected as) structured input. Anything else
/// must parse as a [`ClientEvent`]; failure is the fatal malformed-input
/// condition.
pub fn decode(text: &str) -> Result<InboundFrame, RelayError> {
    match text {
        PING => Ok(InboundFrame::Ping),
        PONG => Ok(InboundFrame::Pong),
        _ => Ok(InboundFrame::Event(serde_json::from_str(text)?)),
    }
}

/// Convert RelayError to ServerEvent for client notification
impl From<&RelayError> for ServerEvent {
    fn from(err: &RelayError) -> Self {
        let message = match err {
            RelayError::Malformed(e) => format!("invalid message format: {}", e),
            RelayError::AlreadyJoined => "already joined a room".to_string(),
            RelayError::InvalidJoin => {
                "join requires a non-empty room id and name".to_string()
            }
            // Fatal errors are not typically converted (connection closes)
            _ => "internal error".to_string(),
        };
        ServerEvent::Error { message }
    }
}
