//! Relay protocol and transport providers.
//!
//! Clients talk to the relay server with JSON messages tagged by `type`.
//! Document payloads are base64-encoded Loro update or snapshot bytes.
//!
//! ```json
//! { "type": "join", "room": "y-vuedraw-1" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "awareness", "client_id": 123, "presence": { "name": "ada", "color": "#f00" } }
//! ```

mod memory;
mod native;

pub use memory::{LocalRelay, LocalTransport};
pub use native::NativeWebSocket;

use crate::awareness::PresenceRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Sync CRDT data (base64 encoded Loro bytes)
    Sync { data: String },
    /// Publish or withdraw (`presence: None`) this client's awareness state
    Awareness {
        client_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence: Option<PresenceRecord>,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join
    Joined {
        room: String,
        peer_count: usize,
        /// Sync payloads the room has seen so far, oldest first
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        history: Vec<String>,
    },
    /// Peer joined the room
    PeerJoined { peer_id: String },
    /// Peer left the room
    PeerLeft { peer_id: String },
    /// Sync data from another peer
    Sync { from: String, data: String },
    /// Awareness update from another peer
    Awareness {
        from: String,
        client_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presence: Option<PresenceRecord>,
    },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "offline",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "online",
            ConnectionState::Error => "error",
        }
    }
}

/// Events from a transport provider
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// Joined a room
    JoinedRoom { room: String, peer_count: usize, history: Vec<Vec<u8>> },
    /// A peer joined the room
    PeerJoined { peer_id: String },
    /// A peer left the room
    PeerLeft { peer_id: String },
    /// Received sync data from a peer
    SyncReceived { from: String, data: Vec<u8> },
    /// Received awareness update from a peer
    AwarenessReceived { from: String, client_id: u64, presence: Option<PresenceRecord> },
    /// Error occurred
    Error { message: String },
}

impl SyncEvent {
    /// Decode a server message into an event.
    ///
    /// Returns `None` for sync messages whose payload is not valid base64.
    /// Undecodable history entries are dropped.
    pub fn from_server_message(msg: ServerMessage) -> Option<Self> {
        let event = match msg {
            ServerMessage::Joined { room, peer_count, history } => {
                let history = history
                    .iter()
                    .filter_map(|payload| match decode_payload(payload) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            log::warn!("Dropping undecodable history entry: {}", e);
                            None
                        }
                    })
                    .collect();
                SyncEvent::JoinedRoom { room, peer_count, history }
            }
            ServerMessage::PeerJoined { peer_id } => SyncEvent::PeerJoined { peer_id },
            ServerMessage::PeerLeft { peer_id } => SyncEvent::PeerLeft { peer_id },
            ServerMessage::Sync { from, data } => match decode_payload(&data) {
                Ok(data) => SyncEvent::SyncReceived { from, data },
                Err(e) => {
                    log::warn!("Dropping undecodable sync payload from {}: {}", from, e);
                    return None;
                }
            },
            ServerMessage::Awareness { from, client_id, presence } => {
                SyncEvent::AwarenessReceived { from, client_id, presence }
            }
            ServerMessage::Error { message } => SyncEvent::Error { message },
        };
        Some(event)
    }
}

/// Errors raised by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Invalid payload: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CRDT error: {0}")]
    Crdt(#[from] loro::LoroError),
    #[error("Shape is missing an id")]
    MissingShapeId,
}

/// Encode document bytes for the wire.
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode document bytes from the wire.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, SyncError> {
    Ok(STANDARD.decode(data)?)
}

/// A connection to a relay room.
///
/// Providers join their room as soon as they connect (and again on every
/// reconnect). Incoming traffic is buffered until [`Transport::poll_events`].
pub trait Transport {
    /// Send a message to the relay.
    fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<SyncEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Close the connection. Fire-and-forget.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let data = b"Hello, World!";
        let encoded = encode_payload(data);
        assert_eq!(decode_payload(&encoded).unwrap(), data.to_vec());
        assert_eq!(encode_payload(b"a"), "YQ==");
    }

    #[test]
    fn test_decode_invalid_payload() {
        assert!(matches!(decode_payload("not base64!"), Err(SyncError::Payload(_))));
    }

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join { room: "y-vuedraw-1".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","room":"y-vuedraw-1"}"#);
    }

    #[test]
    fn test_awareness_withdraw_serializes_without_presence() {
        let msg = ClientMessage::Awareness { client_id: 3, presence: None };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"awareness","client_id":3}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"joined","room":"test","peer_count":2}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Joined { room, peer_count, history } => {
                assert_eq!(room, "test");
                assert_eq!(peer_count, 2);
                assert!(history.is_empty());
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_event_from_sync_message() {
        let msg = ServerMessage::Sync { from: "p1".into(), data: encode_payload(&[1, 2, 3]) };
        assert_eq!(
            SyncEvent::from_server_message(msg),
            Some(SyncEvent::SyncReceived { from: "p1".into(), data: vec![1, 2, 3] })
        );

        let bad = ServerMessage::Sync { from: "p1".into(), data: "%%%".into() };
        assert_eq!(SyncEvent::from_server_message(bad), None);
    }

    #[test]
    fn test_event_from_joined_drops_bad_history() {
        let msg = ServerMessage::Joined {
            room: "r".into(),
            peer_count: 1,
            history: vec![encode_payload(&[9]), "%%%".into()],
        };
        assert_eq!(
            SyncEvent::from_server_message(msg),
            Some(SyncEvent::JoinedRoom { room: "r".into(), peer_count: 1, history: vec![vec![9]] })
        );
    }
}
