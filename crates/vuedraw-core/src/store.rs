//! Shared document store.
//!
//! One [`DocumentStore`] owns the shape document (with its undo manager), the
//! transport to the relay room, and the awareness state carried alongside.
//! Construct it once per page and share it with `Rc`; tests build as many
//! isolated stores as they need.

use crate::awareness::AwarenessHandle;
use crate::crdt::{ShapeDocument, VersionVector};
use crate::sync::{
    ClientMessage, ConnectionState, NativeWebSocket, SyncError, SyncEvent, Transport,
    encode_payload,
};
use std::cell::{Ref, RefCell, RefMut};

/// Document schema version. Bumping it moves clients to a fresh room.
pub const VERSION: u32 = 1;
/// Prefix of the relay room name.
pub const ROOM_PREFIX: &str = "y-vuedraw-";
/// Relay used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3030/ws";

/// Where and how a store connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub relay_url: String,
    pub room_prefix: String,
    pub version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            room_prefix: ROOM_PREFIX.to_string(),
            version: VERSION,
        }
    }
}

impl StoreConfig {
    /// Name of the relay room, e.g. `y-vuedraw-1`.
    pub fn room_id(&self) -> String {
        format!("{}{}", self.room_prefix, self.version)
    }
}

/// The shape document connected to a relay room.
pub struct DocumentStore {
    doc: RefCell<ShapeDocument>,
    transport: RefCell<Box<dyn Transport>>,
    awareness: AwarenessHandle,
    room_id: String,
    /// Version last sent to the room; local changes past it are unsent.
    last_broadcast: RefCell<VersionVector>,
}

impl DocumentStore {
    /// Create a store and start connecting to the configured relay.
    pub fn connect(config: &StoreConfig) -> Result<Self, SyncError> {
        let room_id = config.room_id();
        let transport = NativeWebSocket::connect(&config.relay_url, &room_id)?;
        log::info!("Connecting to {} (room {})", config.relay_url, room_id);
        Ok(Self::with_transport(room_id, Box::new(transport)))
    }

    /// Create a store over an already connected transport.
    pub fn with_transport(room_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let doc = ShapeDocument::new();
        let awareness = AwarenessHandle::new(doc.peer_id());
        let last_broadcast = doc.version();
        Self {
            doc: RefCell::new(doc),
            transport: RefCell::new(transport),
            awareness,
            room_id: room_id.into(),
            last_broadcast: RefCell::new(last_broadcast),
        }
    }

    pub fn doc(&self) -> Ref<'_, ShapeDocument> {
        self.doc.borrow()
    }

    pub fn doc_mut(&self) -> RefMut<'_, ShapeDocument> {
        self.doc.borrow_mut()
    }

    pub fn awareness(&self) -> &AwarenessHandle {
        &self.awareness
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.borrow().state()
    }

    /// Send a message to the room.
    pub fn send(&self, msg: &ClientMessage) -> Result<(), SyncError> {
        self.transport.borrow_mut().send(msg)
    }

    /// Send the document changes made since the last broadcast.
    ///
    /// Returns false when there was nothing to send. On failure the changes
    /// stay pending and go out with the next broadcast or snapshot.
    pub fn broadcast_local_changes(&self) -> Result<bool, SyncError> {
        let (version, bytes) = {
            let doc = self.doc.borrow();
            let version = doc.version();
            if version == *self.last_broadcast.borrow() {
                return Ok(false);
            }
            let bytes = doc.export_updates(&self.last_broadcast.borrow());
            (version, bytes)
        };
        self.send(&ClientMessage::Sync {
            data: encode_payload(&bytes),
        })?;
        log::debug!("Broadcast {} bytes of updates", bytes.len());
        *self.last_broadcast.borrow_mut() = version;
        Ok(true)
    }

    /// Send the full document state.
    pub fn send_snapshot(&self) -> Result<(), SyncError> {
        let (version, bytes) = {
            let doc = self.doc.borrow();
            (doc.version(), doc.export_snapshot())
        };
        self.send(&ClientMessage::Sync {
            data: encode_payload(&bytes),
        })?;
        log::debug!("Sent snapshot ({} bytes)", bytes.len());
        *self.last_broadcast.borrow_mut() = version;
        Ok(())
    }

    /// Import bytes received from the room.
    fn import_remote(&self, bytes: &[u8]) -> Result<(), SyncError> {
        let mut doc = self.doc.borrow_mut();
        let up_to_date = doc.version() == *self.last_broadcast.borrow();
        doc.import(bytes)?;
        // Remote ops need no rebroadcast; only advance when nothing local is pending.
        if up_to_date {
            *self.last_broadcast.borrow_mut() = doc.version();
        }
        Ok(())
    }

    /// Drain transport events and apply them to the document and awareness.
    ///
    /// Returns the events that were handled, in arrival order.
    pub fn tick(&self) -> Vec<SyncEvent> {
        let events = self.transport.borrow_mut().poll_events();
        for event in &events {
            self.handle_event(event);
        }
        self.flush_awareness();
        events
    }

    fn handle_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Connected => log::info!("Connected to relay"),
            SyncEvent::Disconnected => {
                log::info!("Disconnected from relay");
                self.awareness.clear_remote();
            }
            SyncEvent::JoinedRoom { room, peer_count, history } => {
                log::info!("Joined room {} with {} peer(s)", room, peer_count);
                for payload in history {
                    if let Err(e) = self.import_remote(payload) {
                        log::warn!("Failed to import room history: {}", e);
                    }
                }
                // Joined follows every (re)connect: catch the room up on local state.
                if let Err(e) = self.send_snapshot() {
                    log::warn!("Failed to send snapshot: {}", e);
                }
                self.awareness.resend_local();
            }
            SyncEvent::PeerJoined { peer_id } => {
                log::info!("Peer joined: {}", peer_id);
                if let Err(e) = self.send_snapshot() {
                    log::warn!("Failed to send snapshot to {}: {}", peer_id, e);
                }
                self.awareness.resend_local();
            }
            SyncEvent::PeerLeft { peer_id } => {
                log::info!("Peer left: {}", peer_id);
                self.awareness.remove_connection(peer_id);
            }
            SyncEvent::SyncReceived { from, data } => {
                log::debug!("Received {} bytes from {}", data.len(), from);
                if let Err(e) = self.import_remote(data) {
                    log::warn!("Failed to import update from {}: {}", from, e);
                }
            }
            SyncEvent::AwarenessReceived { from, client_id, presence } => {
                self.awareness.apply_remote(from, *client_id, presence.clone());
            }
            SyncEvent::Error { message } => log::warn!("Relay error: {}", message),
        }
    }

    /// Send queued awareness messages.
    pub fn flush_awareness(&self) {
        let outgoing = self.awareness.take_outgoing();
        if outgoing.is_empty() {
            return;
        }
        let mut transport = self.transport.borrow_mut();
        for msg in outgoing {
            if let Err(e) = transport.send(&msg) {
                log::debug!("Awareness not sent: {}", e);
            }
        }
    }

    /// Withdraw local presence and close the connection.
    ///
    /// Fire-and-forget; the relay is not asked to acknowledge.
    pub fn dispose(&self) {
        if self.awareness.local_state().is_some() {
            self.awareness.set_local_state(None);
            self.flush_awareness();
        }
        self.transport.borrow_mut().disconnect();
        log::info!("Left room {}", self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awareness::PresenceRecord;
    use crate::shapes::{ShapeEntry, ShapeKind};
    use crate::sync::LocalRelay;

    fn store(relay: &LocalRelay) -> DocumentStore {
        let room = StoreConfig::default().room_id();
        DocumentStore::with_transport(room.clone(), Box::new(relay.connect(&room)))
    }

    fn rect(id: &str) -> ShapeEntry {
        ShapeEntry::with_id(id, ShapeKind::Rect)
    }

    #[test]
    fn test_room_id() {
        assert_eq!(StoreConfig::default().room_id(), "y-vuedraw-1");
        let config = StoreConfig {
            version: 2,
            ..Default::default()
        };
        assert_eq!(config.room_id(), "y-vuedraw-2");
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let config = StoreConfig {
            relay_url: "ftp://nowhere".into(),
            ..Default::default()
        };
        assert!(matches!(DocumentStore::connect(&config), Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_local_changes_reach_peer() {
        let relay = LocalRelay::new();
        let a = store(&relay);
        let b = store(&relay);
        a.tick();
        b.tick();

        a.doc_mut().replace_all(&[rect("r1")]).unwrap();
        assert!(a.broadcast_local_changes().unwrap());
        assert!(!a.broadcast_local_changes().unwrap());

        b.tick();
        assert_eq!(b.doc().ids(), ["r1"]);
    }

    #[test]
    fn test_late_joiner_catches_up() {
        let relay = LocalRelay::new();
        let a = store(&relay);
        a.tick();
        a.doc_mut().replace_all(&[rect("r1"), rect("r2")]).unwrap();
        a.broadcast_local_changes().unwrap();

        let b = store(&relay);
        b.tick();
        assert_eq!(b.doc().ids(), ["r1", "r2"]);
    }

    #[test]
    fn test_edits_made_offline_are_sent_on_join() {
        let relay = LocalRelay::new();
        let b = store(&relay);
        b.tick();

        // Edited before its transport events were ever polled.
        let a = store(&relay);
        a.doc_mut().replace_all(&[rect("early")]).unwrap();
        a.tick();

        b.tick();
        assert_eq!(b.doc().ids(), ["early"]);
    }

    #[test]
    fn test_awareness_exchange_and_leave() {
        let relay = LocalRelay::new();
        let a = store(&relay);
        let b = store(&relay);
        a.awareness().set_local_state(Some(PresenceRecord::new("ada", "#111")));
        b.awareness().set_local_state(Some(PresenceRecord::new("bob", "#222")));
        a.tick();
        b.tick();
        a.tick();

        assert_eq!(a.awareness().others(), vec![PresenceRecord::new("bob", "#222")]);
        assert_eq!(b.awareness().others(), vec![PresenceRecord::new("ada", "#111")]);

        b.dispose();
        assert_eq!(b.connection_state(), ConnectionState::Disconnected);
        a.tick();
        assert!(a.awareness().others().is_empty());
    }
}
