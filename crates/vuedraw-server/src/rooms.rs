//! Room registry.

use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast;
use vuedraw_core::sync::ServerMessage;

/// Sync payloads kept per room for new joiners.
pub const MAX_ROOM_HISTORY: usize = 100;
/// Capacity of each room's broadcast channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// A broadcast message tagged with the sending peer.
pub type RoomMessage = (String, ServerMessage);

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<RoomMessage>,
    /// Connected peer IDs
    peers: HashSet<String>,
    /// Recent sync payloads, oldest first
    history: VecDeque<String>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            history: VecDeque::new(),
        }
    }
}

/// What a peer gets back when joining.
pub struct Joined {
    pub rx: broadcast::Receiver<RoomMessage>,
    pub history: Vec<String>,
    pub peer_count: usize,
}

/// Active rooms, keyed by room id.
#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<String, Room>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to a room, creating the room on first join.
    pub fn join(&self, room_id: &str, peer_id: &str) -> Joined {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        room.peers.insert(peer_id.to_string());
        Joined {
            rx: room.tx.subscribe(),
            history: room.history.iter().cloned().collect(),
            peer_count: room.peers.len(),
        }
    }

    /// Remove a peer. Empty rooms are dropped along with their history.
    pub fn leave(&self, room_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.peers.remove(peer_id);
        }
        if self.rooms.remove_if(room_id, |_, room| room.peers.is_empty()).is_some() {
            tracing::debug!("Room {} is empty, dropped", room_id);
        }
    }

    /// Append a sync payload to the room history.
    pub fn record_sync(&self, room_id: &str, data: String) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.history.push_back(data);
            while room.history.len() > MAX_ROOM_HISTORY {
                room.history.pop_front();
            }
        }
    }

    /// Send to every subscriber of the room; receivers skip their own messages.
    pub fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.peers.len())
    }

    pub fn history_len(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.history.len())
    }
}
