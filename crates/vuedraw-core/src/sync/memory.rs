//! In-process relay.
//!
//! Speaks the same protocol as the relay server but delivers messages through
//! per-peer inboxes, so several stores can share a room inside one thread.
//! Used for offline mode and tests.

use super::{ClientMessage, ConnectionState, ServerMessage, SyncError, SyncEvent, Transport};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

/// Maximum sync payloads kept per room for late joiners.
pub const MAX_ROOM_HISTORY: usize = 100;

#[derive(Default)]
struct Peer {
    room: Option<String>,
    inbox: VecDeque<SyncEvent>,
}

#[derive(Default)]
struct RelayState {
    next_peer: u64,
    peers: BTreeMap<String, Peer>,
    history: HashMap<String, VecDeque<String>>,
}

impl RelayState {
    fn deliver(&mut self, peer_id: &str, msg: ServerMessage) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            if let Some(event) = SyncEvent::from_server_message(msg) {
                peer.inbox.push_back(event);
            }
        }
    }

    fn room_members(&self, room: &str) -> Vec<String> {
        self.peers
            .iter()
            .filter(|(_, p)| p.room.as_deref() == Some(room))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Send to everyone in `room` except `sender`.
    fn broadcast(&mut self, room: &str, sender: &str, msg: ServerMessage) {
        for member in self.room_members(room) {
            if member != sender {
                self.deliver(&member, msg.clone());
            }
        }
    }

    fn join(&mut self, peer_id: &str, room: &str) {
        self.leave(peer_id);
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.room = Some(room.to_string());
        }
        let peer_count = self.room_members(room).len();
        let history = self
            .history
            .get(room)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        self.deliver(
            peer_id,
            ServerMessage::Joined {
                room: room.to_string(),
                peer_count,
                history,
            },
        );
        self.broadcast(
            room,
            peer_id,
            ServerMessage::PeerJoined {
                peer_id: peer_id.to_string(),
            },
        );
        log::debug!("Local relay: {} joined {} ({} peers)", peer_id, room, peer_count);
    }

    fn leave(&mut self, peer_id: &str) {
        let Some(room) = self.peers.get_mut(peer_id).and_then(|p| p.room.take()) else {
            return;
        };
        self.broadcast(
            &room,
            peer_id,
            ServerMessage::PeerLeft {
                peer_id: peer_id.to_string(),
            },
        );
        if self.room_members(&room).is_empty() {
            self.history.remove(&room);
            log::debug!("Local relay: room {} is empty, dropped", room);
        }
    }

    fn handle(&mut self, peer_id: &str, msg: &ClientMessage) -> Result<(), SyncError> {
        match msg {
            ClientMessage::Join { room } => self.join(peer_id, room),
            ClientMessage::Leave => self.leave(peer_id),
            ClientMessage::Sync { data } => {
                let room = self.room_of(peer_id)?;
                let history = self.history.entry(room.clone()).or_default();
                history.push_back(data.clone());
                while history.len() > MAX_ROOM_HISTORY {
                    history.pop_front();
                }
                self.broadcast(
                    &room,
                    peer_id,
                    ServerMessage::Sync {
                        from: peer_id.to_string(),
                        data: data.clone(),
                    },
                );
            }
            ClientMessage::Awareness { client_id, presence } => {
                let room = self.room_of(peer_id)?;
                self.broadcast(
                    &room,
                    peer_id,
                    ServerMessage::Awareness {
                        from: peer_id.to_string(),
                        client_id: *client_id,
                        presence: presence.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    fn room_of(&self, peer_id: &str) -> Result<String, SyncError> {
        self.peers
            .get(peer_id)
            .and_then(|p| p.room.clone())
            .ok_or(SyncError::NotConnected)
    }
}

/// An in-process relay shared by any number of [`LocalTransport`]s.
#[derive(Clone, Default)]
pub struct LocalRelay {
    state: Rc<RefCell<RelayState>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new peer and join `room`.
    pub fn connect(&self, room: &str) -> LocalTransport {
        let peer_id = {
            let mut state = self.state.borrow_mut();
            state.next_peer += 1;
            let peer_id = format!("local-{}", state.next_peer);
            let mut peer = Peer::default();
            peer.inbox.push_back(SyncEvent::Connected);
            state.peers.insert(peer_id.clone(), peer);
            state.join(&peer_id, room);
            peer_id
        };
        LocalTransport {
            relay: self.state.clone(),
            peer_id,
            connected: true,
        }
    }

    /// Number of peers currently in `room`.
    pub fn peer_count(&self, room: &str) -> usize {
        self.state.borrow().room_members(room).len()
    }

    /// Number of sync payloads kept for `room`.
    pub fn history_len(&self, room: &str) -> usize {
        self.state.borrow().history.get(room).map_or(0, VecDeque::len)
    }
}

/// One peer's connection to a [`LocalRelay`].
pub struct LocalTransport {
    relay: Rc<RefCell<RelayState>>,
    peer_id: String,
    connected: bool,
}

impl LocalTransport {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        self.relay.borrow_mut().handle(&self.peer_id, msg)
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let mut relay = self.relay.borrow_mut();
        match relay.peers.get_mut(&self.peer_id) {
            Some(peer) => peer.inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let mut relay = self.relay.borrow_mut();
        relay.leave(&self.peer_id);
        relay.peers.remove(&self.peer_id);
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
