//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based unique connection identifier
//! - `RoomId`: client-supplied room name

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// Implements Hash and Eq for use as HashMap keys. The registry compares
/// these for identity only and never performs I/O through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier
///
/// Rooms are named by clients in the join payload and used verbatim;
/// no normalization or server-side generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    /// Create a RoomId from a string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Room ids with no content are rejected at join time
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
