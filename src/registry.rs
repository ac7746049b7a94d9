//! Participant registry
//!
//! The single source of truth for which connection sits in which room under
//! which display name. Rooms are derived from membership: a per-room index is
//! kept purely as an access path, and an entry vanishes the moment its last
//! member is removed.

use std::collections::HashMap;

use crate::error::RelayError;
use crate::types::{ConnectionId, RoomId};

/// One joined connection
///
/// Exactly one per connection, created when a join is accepted and removed
/// when the connection closes.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Identity of the underlying connection
    pub conn: ConnectionId,
    /// Room this connection is attached to
    pub room: RoomId,
    /// Display name chosen at join time
    pub name: String,
}

/// Connection → room/name mapping with a per-room membership index
///
/// Mutated only by the relay actor; readers get snapshots, never live
/// iterators, so a broadcast can never observe a half-applied mutation.
#[derive(Debug, Default)]
pub struct Registry {
    /// All joined participants: ConnectionId -> Participant
    participants: HashMap<ConnectionId, Participant>,
    /// Room membership in join order: RoomId -> [ConnectionId]
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection as a participant of a room
    ///
    /// A connection may hold at most one membership; a second join is
    /// rejected with `RelayError::AlreadyJoined` and leaves the existing
    /// record untouched.
    pub fn insert(
        &mut self,
        conn: ConnectionId,
        room: RoomId,
        name: String,
    ) -> Result<(), RelayError> {
        if self.participants.contains_key(&conn) {
            return Err(RelayError::AlreadyJoined);
        }

        self.rooms.entry(room.clone()).or_default().push(conn);
        self.participants
            .insert(conn, Participant { conn, room, name });
        Ok(())
    }

    /// Remove a closing connection, returning its record
    ///
    /// Returns `None` for a connection that never joined. When the last
    /// member of a room is removed the room's index entry is dropped too,
    /// so long-lived processes never accumulate empty rooms.
    pub fn remove(&mut self, conn: ConnectionId) -> Option<Participant> {
        let participant = self.participants.remove(&conn)?;

        if let Some(members) = self.rooms.get_mut(&participant.room) {
            members.retain(|c| *c != conn);
            if members.is_empty() {
                self.rooms.remove(&participant.room);
            }
        }

        Some(participant)
    }

    /// Snapshot of a room's participants, in join order
    ///
    /// An unknown or emptied room yields an empty vec, not an error.
    pub fn members_of(&self, room: &RoomId) -> Vec<&Participant> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|c| self.participants.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of participants currently in a room
    pub fn count_of(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, Vec::len)
    }

    /// Total number of joined participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True when no connection has joined any room
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
