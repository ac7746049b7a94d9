//! Error types for the relay
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum RelayError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame failed to parse as a structured event (fatal - connection is closed)
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Connection sent a second join while already registered
    #[error("already joined a room")]
    AlreadyJoined,

    /// Join payload had an empty room id or name
    #[error("join requires a non-empty room id and name")]
    InvalidJoin,
}

/// Message send errors
///
/// Occurs when attempting to hand a frame to a connection's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The writer's buffer is full; the frame was dropped
    #[error("Channel full")]
    ChannelFull,
}
