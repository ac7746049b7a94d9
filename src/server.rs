//! RelayServer actor implementation
//!
//! The central actor owning all shared state: the participant registry and
//! the peer send handles. Uses the Actor pattern with mpsc channels for
//! message passing, so every registry mutation and every broadcast snapshot
//! is serialized through one task with no locks.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::broadcast::{broadcast, Peer};
use crate::error::RelayError;
use crate::message::{ChatDeliver, LeftNotice, OutboundFrame, ServerEvent, TypingDeliver};
use crate::registry::Registry;
use crate::types::{ConnectionId, RoomId};

/// Commands sent from connection handlers to the RelayServer actor
#[derive(Debug)]
pub enum RelayCommand {
    /// New connection established
    Connect {
        conn: ConnectionId,
        sender: mpsc::Sender<OutboundFrame>,
    },
    /// Connection closed
    Disconnect { conn: ConnectionId },
    /// Attach the connection to a room
    Join {
        conn: ConnectionId,
        room_id: String,
        name: String,
    },
    /// Relay a chat message to a room
    Chat {
        conn: ConnectionId,
        room_id: String,
        sender_name: String,
        text: String,
    },
    /// Relay a typing indicator to a room
    Typing {
        conn: ConnectionId,
        room_id: String,
        sender_name: String,
        is_typing: bool,
    },
}

/// The main RelayServer actor
///
/// Processes commands from connection handlers one at a time. The registry
/// tracks who is in which room; the peer map holds each connection's writer
/// channel for fan-out.
pub struct RelayServer {
    /// Writer handles for every open connection: ConnectionId -> Peer
    peers: HashMap<ConnectionId, Peer>,
    /// Room membership state
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<RelayCommand>,
}

impl RelayServer {
    /// Create a new RelayServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RelayCommand>) -> Self {
        Self {
            peers: HashMap::new(),
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the RelayServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("RelayServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("RelayServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RelayCommand) {
        match cmd {
            RelayCommand::Connect { conn, sender } => {
                self.handle_connect(conn, sender);
            }
            RelayCommand::Disconnect { conn } => {
                self.handle_disconnect(conn);
            }
            RelayCommand::Join {
                conn,
                room_id,
                name,
            } => {
                self.handle_join(conn, room_id, name);
            }
            RelayCommand::Chat {
                conn,
                room_id,
                sender_name,
                text,
            } => {
                self.handle_chat(conn, room_id, sender_name, text);
            }
            RelayCommand::Typing {
                conn,
                room_id,
                sender_name,
                is_typing,
            } => {
                self.handle_typing(conn, room_id, sender_name, is_typing);
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, conn: ConnectionId, sender: mpsc::Sender<OutboundFrame>) {
        info!("Connection {} established", conn);
        self.peers.insert(conn, Peer::new(sender));
        debug!(
            "Open connections: {}, active rooms: {}",
            self.peers.len(),
            self.registry.room_count()
        );
    }

    /// Handle connection close
    ///
    /// Always drops the peer handle. If the connection had joined, its
    /// departure is announced to whoever remains in the room; an emptied
    /// room needs no announcement, and the registry already reflects its
    /// absence.
    fn handle_disconnect(&mut self, conn: ConnectionId) {
        self.peers.remove(&conn);

        let Some(participant) = self.registry.remove(conn) else {
            debug!("Connection {} closed before joining", conn);
            return;
        };

        info!(
            "{} disconnected from room {}",
            participant.name, participant.room
        );

        let count = self.registry.count_of(&participant.room);
        if count > 0 {
            let notice = ServerEvent::Left {
                payload: LeftNotice {
                    message: format!("{} has left the room", participant.name),
                    count,
                },
            };
            let members = self.registry.members_of(&participant.room);
            broadcast(&self.peers, &members, &notice, |_| false);
        } else {
            debug!("Room {} emptied", participant.room);
        }
    }

    /// Handle a join request
    ///
    /// Validates the payload, registers the participant, and announces the
    /// arrival uniformly: every member of the room, the joiner included,
    /// receives the same notice with the updated count.
    fn handle_join(&mut self, conn: ConnectionId, room_id: String, name: String) {
        if room_id.is_empty() || name.is_empty() {
            self.reject(conn, &RelayError::InvalidJoin);
            return;
        }

        let room = RoomId::from_string(room_id);
        if let Err(e) = self.registry.insert(conn, room.clone(), name.clone()) {
            self.reject(conn, &e);
            return;
        }

        let count = self.registry.count_of(&room);
        info!("{} joined room {} ({} members)", name, room, count);

        let notice = ServerEvent::Join {
            message: format!("{} joined the room!", name),
            count,
            new_user: name,
        };
        let members = self.registry.members_of(&room);
        broadcast(&self.peers, &members, &notice, |_| false);
    }

    /// Handle a chat message
    ///
    /// Routed by the room id carried in the payload. Delivery excludes the
    /// authoring connection (it renders its own message locally); a room
    /// with no members is a silent no-op, not an error.
    fn handle_chat(&mut self, conn: ConnectionId, room_id: String, sender_name: String, text: String) {
        let room = RoomId::from_string(room_id);
        let members = self.registry.members_of(&room);
        if members.is_empty() {
            debug!("Chat for room {} with no members, dropped", room);
            return;
        }

        debug!("{} -> room {}: {} bytes", sender_name, room, text.len());

        let event = ServerEvent::Chat {
            payload: ChatDeliver {
                sender: sender_name,
                message: text,
            },
        };
        broadcast(&self.peers, &members, &event, |p| p.conn == conn);
    }

    /// Handle a typing indicator
    ///
    /// Same routing and exclusion as chat.
    fn handle_typing(
        &mut self,
        conn: ConnectionId,
        room_id: String,
        sender_name: String,
        is_typing: bool,
    ) {
        let room = RoomId::from_string(room_id);
        let members = self.registry.members_of(&room);
        if members.is_empty() {
            return;
        }

        let event = ServerEvent::Typing {
            payload: TypingDeliver {
                sender: sender_name,
                is_typing,
            },
        };
        broadcast(&self.peers, &members, &event, |p| p.conn == conn);
    }

    /// Send a rejection back to the offending connection only
    fn reject(&self, conn: ConnectionId, err: &RelayError) {
        debug!("Rejecting request from {}: {}", conn, err);
        if let Some(peer) = self.peers.get(&conn) {
            let _ = peer.send(ServerEvent::from(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connection wired into a fresh server, with its receive side
    fn attach(server: &mut RelayServer) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::channel(16);
        server.handle_command(RelayCommand::Connect { conn, sender: tx });
        (conn, rx)
    }

    fn join(server: &mut RelayServer, conn: ConnectionId, room: &str, name: &str) {
        server.handle_command(RelayCommand::Join {
            conn,
            room_id: room.to_string(),
            name: name.to_string(),
        });
    }

    fn next_event(rx: &mut mpsc::Receiver<OutboundFrame>) -> ServerEvent {
        match rx.try_recv().expect("expected a queued frame") {
            OutboundFrame::Event(event) => event,
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    fn new_server() -> RelayServer {
        let (_tx, rx) = mpsc::channel(1);
        RelayServer::new(rx)
    }

    #[test]
    fn test_two_joins_chat_and_leave_scenario() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        let (b, mut rx_b) = attach(&mut server);

        join(&mut server, a, "42", "alice");
        match next_event(&mut rx_a) {
            ServerEvent::Join { count, new_user, .. } => {
                assert_eq!(count, 1);
                assert_eq!(new_user, "alice");
            }
            other => panic!("wrong event: {:?}", other),
        }

        join(&mut server, b, "42", "bob");
        // Both members, joiner included, see count=2
        for rx in [&mut rx_a, &mut rx_b] {
            match next_event(rx) {
                ServerEvent::Join { count, new_user, message } => {
                    assert_eq!(count, 2);
                    assert_eq!(new_user, "bob");
                    assert_eq!(message, "bob joined the room!");
                }
                other => panic!("wrong event: {:?}", other),
            }
        }

        // Alice chats; only bob receives it
        server.handle_command(RelayCommand::Chat {
            conn: a,
            room_id: "42".to_string(),
            sender_name: "alice".to_string(),
            text: "hi".to_string(),
        });
        match next_event(&mut rx_b) {
            ServerEvent::Chat { payload } => {
                assert_eq!(payload.sender, "alice");
                assert_eq!(payload.message, "hi");
            }
            other => panic!("wrong event: {:?}", other),
        }
        assert!(rx_a.try_recv().is_err(), "sender must not receive an echo");

        // Bob disconnects; alice gets the leave notice with count=1
        server.handle_command(RelayCommand::Disconnect { conn: b });
        match next_event(&mut rx_a) {
            ServerEvent::Left { payload } => {
                assert_eq!(payload.message, "bob has left the room");
                assert_eq!(payload.count, 1);
            }
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_chat_never_crosses_rooms() {
        let mut server = new_server();
        let (a, _rx_a) = attach(&mut server);
        let (b, mut rx_b) = attach(&mut server);
        let (c, mut rx_c) = attach(&mut server);

        join(&mut server, a, "42", "alice");
        join(&mut server, b, "42", "bob");
        join(&mut server, c, "other", "carol");

        // Drain join notices
        while rx_b.try_recv().is_ok() {}
        while rx_c.try_recv().is_ok() {}

        server.handle_command(RelayCommand::Chat {
            conn: a,
            room_id: "42".to_string(),
            sender_name: "alice".to_string(),
            text: "hi".to_string(),
        });

        assert!(matches!(next_event(&mut rx_b), ServerEvent::Chat { .. }));
        assert!(rx_c.try_recv().is_err(), "other rooms must not see the chat");
    }

    #[test]
    fn test_duplicate_name_still_delivered() {
        // Two participants picked the same display name; exclusion is by
        // connection identity, so each still sees the other's messages.
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        let (b, mut rx_b) = attach(&mut server);

        join(&mut server, a, "42", "alice");
        join(&mut server, b, "42", "alice");
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        server.handle_command(RelayCommand::Chat {
            conn: a,
            room_id: "42".to_string(),
            sender_name: "alice".to_string(),
            text: "which alice?".to_string(),
        });

        assert!(matches!(next_event(&mut rx_b), ServerEvent::Chat { .. }));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_before_join_is_silent() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        let (b, _rx_b) = attach(&mut server);
        join(&mut server, a, "42", "alice");
        while rx_a.try_recv().is_ok() {}

        server.handle_command(RelayCommand::Disconnect { conn: b });

        assert!(rx_a.try_recv().is_err(), "no broadcast for a never-joined close");
        assert_eq!(server.registry.len(), 1);
    }

    #[test]
    fn test_last_leave_empties_room_without_broadcast() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        join(&mut server, a, "42", "alice");
        while rx_a.try_recv().is_ok() {}

        server.handle_command(RelayCommand::Disconnect { conn: a });

        assert_eq!(server.registry.room_count(), 0);
        assert!(server
            .registry
            .members_of(&RoomId::from_string("42".to_string()))
            .is_empty());
    }

    #[test]
    fn test_duplicate_join_rejected_without_state_change() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        join(&mut server, a, "42", "alice");
        while rx_a.try_recv().is_ok() {}

        join(&mut server, a, "99", "alice-again");

        match next_event(&mut rx_a) {
            ServerEvent::Error { message } => assert_eq!(message, "already joined a room"),
            other => panic!("wrong event: {:?}", other),
        }
        assert_eq!(server.registry.count_of(&RoomId::from_string("42".to_string())), 1);
        assert_eq!(server.registry.count_of(&RoomId::from_string("99".to_string())), 0);
    }

    #[test]
    fn test_empty_join_fields_rejected() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);

        join(&mut server, a, "", "alice");

        assert!(matches!(next_event(&mut rx_a), ServerEvent::Error { .. }));
        assert!(server.registry.is_empty());
    }

    #[test]
    fn test_chat_to_unknown_room_is_noop() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);

        server.handle_command(RelayCommand::Chat {
            conn: a,
            room_id: "nobody-here".to_string(),
            sender_name: "alice".to_string(),
            text: "hello?".to_string(),
        });

        assert!(rx_a.try_recv().is_err());
        assert!(server.registry.is_empty());
    }

    #[test]
    fn test_typing_excludes_sender() {
        let mut server = new_server();
        let (a, mut rx_a) = attach(&mut server);
        let (b, mut rx_b) = attach(&mut server);
        join(&mut server, a, "42", "alice");
        join(&mut server, b, "42", "bob");
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        server.handle_command(RelayCommand::Typing {
            conn: a,
            room_id: "42".to_string(),
            sender_name: "alice".to_string(),
            is_typing: true,
        });

        match next_event(&mut rx_b) {
            ServerEvent::Typing { payload } => {
                assert_eq!(payload.sender, "alice");
                assert!(payload.is_typing);
            }
            other => panic!("wrong event: {:?}", other),
        }
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_count_tracks_join_leave_sequences() {
        let mut server = new_server();
        let room = RoomId::from_string("42".to_string());

        let (a, _rx_a) = attach(&mut server);
        let (b, _rx_b) = attach(&mut server);
        let (c, _rx_c) = attach(&mut server);

        join(&mut server, a, "42", "alice");
        assert_eq!(server.registry.count_of(&room), 1);
        join(&mut server, b, "42", "bob");
        assert_eq!(server.registry.count_of(&room), 2);
        join(&mut server, c, "42", "carol");
        assert_eq!(server.registry.count_of(&room), 3);

        server.handle_command(RelayCommand::Disconnect { conn: b });
        assert_eq!(server.registry.count_of(&room), 2);
        server.handle_command(RelayCommand::Disconnect { conn: a });
        assert_eq!(server.registry.count_of(&room), 1);
        server.handle_command(RelayCommand::Disconnect { conn: c });
        assert_eq!(server.registry.count_of(&room), 0);
    }
}
