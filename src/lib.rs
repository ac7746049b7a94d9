//! Room-based WebSocket Message Relay Library
//!
//! A real-time relay built with tokio-tungstenite using the Actor pattern
//! for state management. Clients attach to named rooms over a persistent
//! WebSocket connection; chat messages, presence notifications, and typing
//! indicators fan out to the other participants of the same room.
//!
//! # Features
//! - WebSocket connection handling
//! - Named rooms with live member counts
//! - Real-time chat relay with sender echo suppression
//! - Typing indicators
//! - Join/leave presence notifications
//! - Application-level ping/pong keepalive
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RelayServer` is the central actor owning the participant registry
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_relay::{RelayServer, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(RelayServer::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod broadcast;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Peer;
pub use error::{RelayError, SendError};
pub use handler::handle_connection;
pub use message::{ClientEvent, OutboundFrame, ServerEvent};
pub use registry::{Participant, Registry};
pub use server::{RelayCommand, RelayServer};
pub use types::{ConnectionId, RoomId};
