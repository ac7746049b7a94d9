//! Room broadcast engine
//!
//! Fans an event out over a room membership snapshot, applying the caller's
//! exclusion rule. Delivery hands each frame to the target connection's
//! writer task through a bounded channel: a full buffer drops that one frame
//! and a closed channel means the connection is already tearing down, so
//! neither can stall or fail the rest of the room.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::{OutboundFrame, ServerEvent};
use crate::registry::Participant;
use crate::types::ConnectionId;

/// Send handle for one connection
///
/// Wraps the channel feeding that connection's writer task. Sends are
/// non-blocking; backpressure is resolved by dropping the frame.
#[derive(Debug, Clone)]
pub struct Peer {
    sender: mpsc::Sender<OutboundFrame>,
}

impl Peer {
    /// Create a peer handle from a writer-task channel
    pub fn new(sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self { sender }
    }

    /// Queue an event for this connection without blocking
    pub fn send(&self, event: ServerEvent) -> Result<(), SendError> {
        self.sender
            .try_send(OutboundFrame::Event(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
                mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
            })
    }
}

/// Deliver an event to every member of a room snapshot not excluded by the
/// predicate
///
/// Iterates the snapshot in registry join order. Members whose peer handle is
/// already gone (disconnect racing the broadcast) are skipped silently.
pub fn broadcast<F>(
    peers: &HashMap<ConnectionId, Peer>,
    members: &[&Participant],
    event: &ServerEvent,
    exclude: F,
) where
    F: Fn(&Participant) -> bool,
{
    for &member in members {
        if exclude(member) {
            continue;
        }

        let Some(peer) = peers.get(&member.conn) else {
            continue;
        };

        match peer.send(event.clone()) {
            Ok(()) => {}
            Err(SendError::ChannelFull) => {
                warn!("Dropping frame for slow connection {}", member.conn);
            }
            Err(SendError::ChannelClosed) => {
                debug!("Connection {} is closing, frame skipped", member.conn);
            }
        }
    }
}
