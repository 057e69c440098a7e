//! Awareness: ephemeral per-peer state carried next to the document sync.
//!
//! Each client publishes one optional [`PresenceRecord`] under its client id.
//! Remote records are keyed by client id and tagged with the relay connection
//! they arrived on, so that they can be dropped when that connection leaves.

use crate::sync::ClientMessage;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Cursor position in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

/// What a peer publishes about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub name: String,
    pub color: String,
    /// Declared for remote cursor rendering; nothing in this crate sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl PresenceRecord {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            cursor: None,
        }
    }
}

/// Identifier of a registered change listener.
pub type ListenerId = u64;

type Listener = Rc<dyn Fn(&[PresenceRecord])>;

struct RemoteState {
    connection: String,
    presence: PresenceRecord,
}

/// Local and remote awareness states.
pub struct Awareness {
    client_id: u64,
    local: Option<PresenceRecord>,
    remote: BTreeMap<u64, RemoteState>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
    outgoing: Vec<ClientMessage>,
}

impl Awareness {
    pub fn new(client_id: u64) -> Self {
        Self {
            client_id,
            local: None,
            remote: BTreeMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            outgoing: Vec::new(),
        }
    }

    fn queue_local(&mut self) {
        self.outgoing.push(ClientMessage::Awareness {
            client_id: self.client_id,
            presence: self.local.clone(),
        });
    }

    fn others(&self) -> Vec<PresenceRecord> {
        self.remote.values().map(|r| r.presence.clone()).collect()
    }
}

/// Shared handle to an [`Awareness`].
///
/// Listeners run after the internal borrow is released, so they may read the
/// handle again.
#[derive(Clone)]
pub struct AwarenessHandle(Rc<RefCell<Awareness>>);

impl AwarenessHandle {
    pub fn new(client_id: u64) -> Self {
        Self(Rc::new(RefCell::new(Awareness::new(client_id))))
    }

    pub fn client_id(&self) -> u64 {
        self.0.borrow().client_id
    }

    /// The locally published record.
    pub fn local_state(&self) -> Option<PresenceRecord> {
        self.0.borrow().local.clone()
    }

    /// Publish (or with `None`, withdraw) the local record.
    pub fn set_local_state(&self, presence: Option<PresenceRecord>) {
        let mut awareness = self.0.borrow_mut();
        awareness.local = presence;
        awareness.queue_local();
    }

    /// Queue the local record again, e.g. for a peer that just joined.
    pub fn resend_local(&self) {
        let mut awareness = self.0.borrow_mut();
        if awareness.local.is_some() {
            awareness.queue_local();
        }
    }

    /// Records of every peer except this one, ordered by client id.
    pub fn others(&self) -> Vec<PresenceRecord> {
        self.0.borrow().others()
    }

    /// Number of known remote peers.
    pub fn peer_count(&self) -> usize {
        self.0.borrow().remote.len()
    }

    /// Apply a record received from the relay.
    pub fn apply_remote(&self, connection: &str, client_id: u64, presence: Option<PresenceRecord>) {
        let changed = {
            let mut awareness = self.0.borrow_mut();
            if client_id == awareness.client_id {
                return;
            }
            match presence {
                Some(presence) => {
                    let previous = awareness.remote.insert(
                        client_id,
                        RemoteState {
                            connection: connection.to_string(),
                            presence: presence.clone(),
                        },
                    );
                    previous.map(|p| p.presence) != Some(presence)
                }
                None => awareness.remote.remove(&client_id).is_some(),
            }
        };
        if changed {
            self.notify();
        }
    }

    /// Drop every record that arrived on `connection`.
    pub fn remove_connection(&self, connection: &str) {
        let changed = {
            let mut awareness = self.0.borrow_mut();
            let before = awareness.remote.len();
            awareness.remote.retain(|_, r| r.connection != connection);
            awareness.remote.len() != before
        };
        if changed {
            self.notify();
        }
    }

    /// Drop every remote record, e.g. after losing the relay connection.
    pub fn clear_remote(&self) {
        let changed = {
            let mut awareness = self.0.borrow_mut();
            let had_peers = !awareness.remote.is_empty();
            awareness.remote.clear();
            had_peers
        };
        if changed {
            self.notify();
        }
    }

    /// Register a listener called with the new `others` list on every change.
    pub fn on_change(&self, listener: impl Fn(&[PresenceRecord]) + 'static) -> ListenerId {
        let mut awareness = self.0.borrow_mut();
        let id = awareness.next_listener;
        awareness.next_listener += 1;
        awareness.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off_change(&self, id: ListenerId) -> bool {
        let mut awareness = self.0.borrow_mut();
        let before = awareness.listeners.len();
        awareness.listeners.retain(|(lid, _)| *lid != id);
        awareness.listeners.len() != before
    }

    /// Drain queued outgoing awareness messages.
    pub fn take_outgoing(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.0.borrow_mut().outgoing)
    }

    fn notify(&self) {
        let (others, listeners) = {
            let awareness = self.0.borrow();
            let listeners: Vec<Listener> = awareness.listeners.iter().map(|(_, l)| l.clone()).collect();
            (awareness.others(), listeners)
        };
        for listener in listeners {
            listener(&others);
        }
    }
}
