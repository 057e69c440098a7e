//! Presence room over the store's awareness channel.

use crate::awareness::{AwarenessHandle, ListenerId, PresenceRecord};
use crate::state::{State, use_state};
use crate::store::DocumentStore;

/// This client's membership in the presence room.
pub struct PresenceRoom {
    awareness: AwarenessHandle,
}

impl PresenceRoom {
    /// Enter the room publishing `initial`.
    pub fn new(awareness: AwarenessHandle, initial: PresenceRecord) -> Self {
        awareness.set_local_state(Some(initial));
        Self { awareness }
    }

    /// The record this client currently publishes.
    pub fn presence(&self) -> Option<PresenceRecord> {
        self.awareness.local_state()
    }

    /// Edit the published record and broadcast the result.
    ///
    /// Does nothing after [`PresenceRoom::leave`].
    pub fn update_presence(&self, update: impl FnOnce(&mut PresenceRecord)) {
        if let Some(mut presence) = self.awareness.local_state() {
            update(&mut presence);
            self.awareness.set_local_state(Some(presence));
        }
    }

    /// Everyone else in the room.
    pub fn others(&self) -> Vec<PresenceRecord> {
        self.awareness.others()
    }

    /// Call `callback` with the current others now and on every change.
    pub fn subscribe_others(&self, callback: impl Fn(&[PresenceRecord]) + 'static) -> Unsubscribe {
        callback(&self.awareness.others());
        let id = self.awareness.on_change(callback);
        Unsubscribe {
            awareness: self.awareness.clone(),
            id,
        }
    }

    /// Withdraw this client's record.
    pub fn leave(&self) {
        self.awareness.set_local_state(None);
    }
}

/// Detaches a [`PresenceRoom::subscribe_others`] callback.
#[must_use = "dropping this keeps the callback attached"]
pub struct Unsubscribe {
    awareness: AwarenessHandle,
    id: ListenerId,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.awareness.off_change(self.id);
    }
}

/// Presence state handed to the view.
pub struct Users {
    pub room: PresenceRoom,
    /// Other peers' records, kept current while subscribed.
    pub others: State<Vec<PresenceRecord>>,
    pub unsub_others: Unsubscribe,
}

/// Join the store's presence room as `init` and track the other peers.
///
/// Cursor positions are part of [`PresenceRecord`] but are not published from here.
pub fn use_users(store: &DocumentStore, init: PresenceRecord) -> Users {
    let room = PresenceRoom::new(store.awareness().clone(), init);
    let (others, set_others) = use_state(Vec::new());
    let unsub_others = room.subscribe_others(move |records| set_others.set(records.to_vec()));
    Users {
        room,
        others,
        unsub_others,
    }
}
