//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, frame
//! decoding, keepalive, and bidirectional communication with the RelayServer.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::message::{self, ClientEvent, InboundFrame, OutboundFrame, ServerEvent, PING, PONG};
use crate::server::RelayCommand;
use crate::types::ConnectionId;

/// Application-level keepalive period; the timer lives in the writer task
/// and dies with it on disconnect
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(40);

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle. Returns when the connection has
/// been torn down and the relay notified.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RelayCommand>,
) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let conn = ConnectionId::new();
    info!("Connection {} opened from {}", conn, peer_addr);

    // Channel feeding this connection's writer task
    let (frame_tx, mut frame_rx) = mpsc::channel::<OutboundFrame>(32);
    let frame_tx_read = frame_tx.clone();

    // Register with the relay; the actor keeps this sender until Disconnect
    if cmd_tx
        .send(RelayCommand::Connect {
            conn,
            sender: frame_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register connection {} - server closed", conn);
        return Err(RelayError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> RelayCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    if !process_text_frame(conn, &text, &cmd_tx_read, &frame_tx_read).await {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", conn);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Transport-level ping; pong is handled by tungstenite
                    debug!("Transport ping from {}", conn);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Transport pong from {}", conn);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", conn, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", conn);
    });

    // Spawn write task (OutboundFrame -> WebSocket), which also owns the
    // keepalive timer. First ping fires one full interval after connect.
    let write_task = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + KEEPALIVE_INTERVAL;
        let mut keepalive = tokio::time::interval_at(start, KEEPALIVE_INTERVAL);

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match frame {
                        OutboundFrame::Event(event) => match event.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        },
                        OutboundFrame::Pong => PONG.to_string(),
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    debug!("Keepalive ping to {}", conn);
                    if ws_sender.send(Message::Text(PING.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Write task ended for {}", conn);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", conn);
        }
        _ = write_task => {
            debug!("Write task completed for {}", conn);
        }
    }

    // Send disconnect command; the actor drops its sender, which lets the
    // write task drain any queued frames (an error notice included) and close
    let _ = cmd_tx.send(RelayCommand::Disconnect { conn }).await;

    info!("Connection {} closed", conn);

    Ok(())
}

/// Process one inbound text frame
///
/// Keepalive frames are answered or ignored without ever reaching the relay
/// actor. Structured events become commands. A malformed frame is fatal:
/// an error notice is queued for the peer and reading stops, which tears the
/// connection down. Returns whether the read loop should continue.
async fn process_text_frame(
    conn: ConnectionId,
    text: &str,
    cmd_tx: &mpsc::Sender<RelayCommand>,
    frame_tx: &mpsc::Sender<OutboundFrame>,
) -> bool {
    match message::decode(text) {
        Ok(InboundFrame::Ping) => {
            debug!("Keepalive ping from {}", conn);
            // Buffer full means a reply is already pending; the peer re-pings
            let _ = frame_tx.try_send(OutboundFrame::Pong);
            true
        }
        Ok(InboundFrame::Pong) => {
            debug!("Keepalive pong from {}", conn);
            true
        }
        Ok(InboundFrame::Event(event)) => {
            let cmd = client_event_to_command(conn, event);
            if cmd_tx.send(cmd).await.is_err() {
                debug!("Server closed, ending read task for {}", conn);
                return false;
            }
            true
        }
        Err(e) => {
            warn!("Malformed frame from {}: {}", conn, e);
            let _ = frame_tx.try_send(OutboundFrame::Event(ServerEvent::from(&e)));
            false
        }
    }
}

/// Convert a ClientEvent to a RelayCommand
fn client_event_to_command(conn: ConnectionId, event: ClientEvent) -> RelayCommand {
    match event {
        ClientEvent::Join { payload } => RelayCommand::Join {
            conn,
            room_id: payload.room_id,
            name: payload.name,
        },
        ClientEvent::Chat { payload } => RelayCommand::Chat {
            conn,
            room_id: payload.room_id,
            sender_name: payload.sender,
            text: payload.message,
        },
        ClientEvent::Typing { payload } => RelayCommand::Typing {
            conn,
            room_id: payload.room_id,
            sender_name: payload.sender,
            is_typing: payload.is_typing,
        },
    }
}
