//! Canvas ⇄ document synchronization.
//!
//! Local page changes are written to the shape document as a full
//! clear-and-rewrite; any change of the shape map (local, remote or undo)
//! reloads the whole canvas scene from the map. Both directions go through
//! one event queue that is drained in arrival order by [`Multiplayer::pump`].

use crate::canvas::{CanvasHandle, Scene};
use crate::crdt::Subscription;
use crate::shapes::ShapeEntry;
use crate::state::{Setter, State, use_state};
use crate::store::DocumentStore;
use crate::sync::{SyncError, SyncEvent};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Work item for the sync queue.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiplayerEvent {
    /// The canvas reported its full post-edit object list.
    LocalEdit(Vec<ShapeEntry>),
    /// The shape map changed and the canvas needs a reload.
    DocumentChanged,
}

/// Binds a mounted canvas to a [`DocumentStore`].
pub struct Multiplayer {
    store: Rc<DocumentStore>,
    canvas: State<Option<CanvasHandle>>,
    set_canvas: Setter<Option<CanvasHandle>>,
    events_tx: Sender<MultiplayerEvent>,
    events_rx: Receiver<MultiplayerEvent>,
    subscription: Option<Subscription>,
}

/// Start synchronizing against `store`. Mount a canvas with
/// [`Multiplayer::on_mount`] to see the shapes.
pub fn use_multiplayer(store: Rc<DocumentStore>) -> Multiplayer {
    let (canvas, set_canvas) = use_state(None);
    let (events_tx, events_rx) = channel();
    let notify = events_tx.clone();
    let subscription = store.doc().subscribe_shapes(move || {
        let _ = notify.send(MultiplayerEvent::DocumentChanged);
    });
    Multiplayer {
        store,
        canvas,
        set_canvas,
        events_tx,
        events_rx,
        subscription: Some(subscription),
    }
}

impl Multiplayer {
    pub fn store(&self) -> &Rc<DocumentStore> {
        &self.store
    }

    /// The mounted canvas, if any.
    pub fn canvas(&self) -> Option<CanvasHandle> {
        self.canvas.get()
    }

    /// Make `canvas` the active canvas and load the current shapes into it.
    pub fn on_mount(&self, canvas: CanvasHandle) {
        self.set_canvas.set(Some(canvas));
        self.reload();
    }

    /// Write the canvas' full object list to the document.
    ///
    /// Objects without an id are rejected before anything is written.
    pub fn on_change_page(&self, objects: Vec<ShapeEntry>) -> Result<(), SyncError> {
        if objects.iter().any(|o| o.id.is_empty()) {
            return Err(SyncError::MissingShapeId);
        }
        let _ = self.events_tx.send(MultiplayerEvent::LocalEdit(objects));
        self.pump()
    }

    /// Undo the last local edit. Returns whether a step was applied.
    pub fn on_undo(&self) -> Result<bool, SyncError> {
        let applied = self.store.doc_mut().undo();
        self.after_history_step(applied)
    }

    /// Redo the last undone edit. Returns whether a step was applied.
    pub fn on_redo(&self) -> Result<bool, SyncError> {
        let applied = self.store.doc_mut().redo();
        self.after_history_step(applied)
    }

    fn after_history_step(&self, applied: bool) -> Result<bool, SyncError> {
        if applied {
            self.broadcast();
        }
        self.pump()?;
        Ok(applied)
    }

    /// Poll the transport, then drain the sync queue.
    pub fn tick(&self) -> Result<Vec<SyncEvent>, SyncError> {
        let events = self.store.tick();
        self.pump()?;
        Ok(events)
    }

    /// Drain the sync queue in arrival order.
    ///
    /// Consecutive change notifications collapse into one reload.
    pub fn pump(&self) -> Result<(), SyncError> {
        let mut reload_pending = false;
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                MultiplayerEvent::DocumentChanged => reload_pending = true,
                MultiplayerEvent::LocalEdit(objects) => {
                    if std::mem::take(&mut reload_pending) {
                        self.reload();
                    }
                    self.store.doc_mut().replace_all(&objects)?;
                    log::debug!("Wrote {} shape(s) to the document", objects.len());
                    self.broadcast();
                }
            }
        }
        if reload_pending {
            self.reload();
        }
        Ok(())
    }

    /// Replace the canvas scene with the shapes in the document.
    ///
    /// Returns false if no canvas is mounted or the canvas refused the scene,
    /// in which case the previous scene stays.
    pub fn reload(&self) -> bool {
        let Some(canvas) = self.canvas.get() else {
            return false;
        };
        let shapes = self.store.doc().shapes();
        let count = shapes.len();
        match canvas.borrow_mut().load_scene(Scene::new(shapes)) {
            Ok(()) => {
                log::trace!("Reloaded canvas with {} shape(s)", count);
                true
            }
            Err(e) => {
                log::warn!("Failed to reload canvas: {}", e);
                false
            }
        }
    }

    fn broadcast(&self) {
        if let Err(e) = self.store.broadcast_local_changes() {
            log::warn!("Failed to broadcast changes: {}", e);
        }
    }

    /// Stop observing the document and leave the room.
    pub fn dispose(&mut self) {
        self.subscription = None;
        self.set_canvas.set(None);
        self.store.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, CanvasError, SceneCanvas};
    use crate::shapes::ShapeKind;
    use crate::store::StoreConfig;
    use crate::sync::LocalRelay;
    use std::cell::RefCell;

    struct Peer {
        multiplayer: Multiplayer,
        canvas: Rc<RefCell<SceneCanvas>>,
    }

    impl Peer {
        fn join(relay: &LocalRelay) -> Self {
            let room = StoreConfig::default().room_id();
            let store = DocumentStore::with_transport(room.clone(), Box::new(relay.connect(&room)));
            let multiplayer = use_multiplayer(Rc::new(store));
            let canvas = Rc::new(RefCell::new(SceneCanvas::new()));
            multiplayer.on_mount(canvas.clone());
            Self { multiplayer, canvas }
        }

        fn add(&self, shape: ShapeEntry) {
            let objects = self.canvas.borrow_mut().add(shape);
            self.multiplayer.on_change_page(objects).unwrap();
        }

        fn remove(&self, id: &str) {
            let objects = self.canvas.borrow_mut().remove(id).unwrap();
            self.multiplayer.on_change_page(objects).unwrap();
        }

        fn ids(&self) -> Vec<String> {
            self.canvas.borrow().objects().iter().map(|o| o.id.clone()).collect()
        }
    }

    fn settle(peers: &[&Peer]) {
        for _ in 0..3 {
            for peer in peers {
                peer.multiplayer.tick().unwrap();
            }
        }
    }

    fn offline() -> (Multiplayer, Rc<RefCell<SceneCanvas>>) {
        let peer = Peer::join(&LocalRelay::new());
        (peer.multiplayer, peer.canvas)
    }

    fn rect(id: &str, left: f64) -> ShapeEntry {
        ShapeEntry::with_id(id, ShapeKind::Rect).with_prop("left", left)
    }

    #[test]
    fn test_key_set_matches_after_each_edit() {
        let (mp, _) = offline();
        let batches = vec![
            vec![rect("a", 0.0)],
            vec![rect("a", 0.0), rect("b", 1.0), rect("c", 2.0)],
            vec![rect("c", 2.0)],
            vec![],
        ];
        for objects in batches {
            let mut expected: Vec<String> = objects.iter().map(|o| o.id.clone()).collect();
            expected.sort();
            mp.on_change_page(objects).unwrap();
            assert_eq!(mp.store().doc().ids(), expected);
        }
    }

    #[test]
    fn test_roundtrip_preserves_order_and_payload() {
        let (mp, canvas) = offline();
        let objects = vec![
            rect("z", 0.0).with_prop("fill", "#ff0000"),
            ShapeEntry::with_id("a", ShapeKind::Textbox).with_prop("text", "hi"),
            ShapeEntry::with_id("m", ShapeKind::Object).with_prop("custom", serde_json::json!({ "k": [1, 2] })),
        ];
        mp.on_change_page(objects.clone()).unwrap();
        assert!(mp.reload());
        assert_eq!(canvas.borrow().objects(), objects.as_slice());
    }

    #[test]
    fn test_toolkit_scene_json_survives_sync() {
        let json = r##"{"objects":[
            {"id":"p1","type":"path","path":[["M",0,0],["Q",1.5,2,3,4]],"left":0,"top":0,"strokeWidth":2},
            {"id":"c1","type":"circle","radius":5,"fill":null,"shadow":{"blur":3,"offset":[1,-1]}},
            {"id":"t1","type":"i-text","text":"hi","styles":{}},
            {"id":"g1","type":"group","objects":[{"type":"rect","width":1}],"seed":18446744073709551615}
        ]}"##;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.objects[2].kind, ShapeKind::Other("i-text".into()));

        let relay = LocalRelay::new();
        let a = Peer::join(&relay);
        let b = Peer::join(&relay);
        settle(&[&a, &b]);

        a.multiplayer.on_change_page(scene.objects.clone()).unwrap();
        settle(&[&a, &b]);

        let expected: serde_json::Value = serde_json::from_str(json).unwrap();
        for peer in [&a, &b] {
            assert!(peer.multiplayer.reload());
            let synced = peer.canvas.borrow().to_scene();
            assert_eq!(synced, scene);
            assert_eq!(serde_json::to_value(&synced).unwrap(), expected);
        }
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (mp, canvas) = offline();
        mp.on_change_page(vec![rect("a", 0.0), rect("b", 1.0)]).unwrap();
        let version = mp.store().doc().version();

        mp.reload();
        let first = canvas.borrow().to_scene();
        mp.reload();
        assert_eq!(canvas.borrow().to_scene(), first);
        // Reloading never writes back.
        assert_eq!(mp.store().doc().version(), version);
    }

    #[test]
    fn test_change_notifications_coalesce() {
        let (mp, canvas) = offline();
        let loads = canvas.borrow().load_count();
        mp.on_change_page(vec![rect("a", 0.0)]).unwrap();
        assert_eq!(canvas.borrow().load_count(), loads + 1);
        mp.pump().unwrap();
        assert_eq!(canvas.borrow().load_count(), loads + 1);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let (mp, _) = offline();
        mp.on_change_page(vec![rect("a", 0.0)]).unwrap();
        let result = mp.on_change_page(vec![rect("b", 0.0), ShapeEntry::with_id("", ShapeKind::Line)]);
        assert!(matches!(result, Err(SyncError::MissingShapeId)));
        assert_eq!(mp.store().doc().ids(), ["a"]);
    }

    #[test]
    fn test_undo_redo_walks_history() {
        let (mp, canvas) = offline();
        let states = vec![
            vec![rect("a", 0.0)],
            vec![rect("a", 0.0), rect("b", 1.0)],
            vec![rect("a", 5.0), rect("b", 1.0)],
        ];
        for objects in &states {
            mp.on_change_page(objects.clone()).unwrap();
        }

        assert!(mp.on_undo().unwrap());
        assert_eq!(canvas.borrow().objects(), states[1].as_slice());
        assert!(mp.on_undo().unwrap());
        assert_eq!(canvas.borrow().objects(), states[0].as_slice());
        assert!(mp.on_undo().unwrap());
        assert!(canvas.borrow().is_empty());
        assert!(!mp.on_undo().unwrap());

        for expected in &states {
            assert!(mp.on_redo().unwrap());
            assert_eq!(canvas.borrow().objects(), expected.as_slice());
        }
        assert!(!mp.on_redo().unwrap());
    }

    #[test]
    fn test_peer_sees_drawn_rect() {
        let relay = LocalRelay::new();
        let a = Peer::join(&relay);
        let b = Peer::join(&relay);
        settle(&[&a, &b]);

        a.add(ShapeEntry::with_id("r1", ShapeKind::Rect));
        settle(&[&a, &b]);

        let objects = b.canvas.borrow().objects().to_vec();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].id, "r1");
        assert_eq!(objects[0].kind, ShapeKind::Rect);
    }

    #[test]
    fn test_deleted_before_join_stays_deleted() {
        let relay = LocalRelay::new();
        let a = Peer::join(&relay);
        settle(&[&a]);
        a.add(rect("r1", 0.0));
        a.remove("r1");

        let b = Peer::join(&relay);
        settle(&[&a, &b]);
        assert!(b.ids().is_empty());
        assert!(b.multiplayer.store().doc().ids().is_empty());
    }

    #[test]
    fn test_concurrent_adds_converge() {
        let relay = LocalRelay::new();
        let a = Peer::join(&relay);
        let b = Peer::join(&relay);
        settle(&[&a, &b]);

        a.add(rect("r1", 0.0));
        b.add(ShapeEntry::with_id("e1", ShapeKind::Ellipse));
        settle(&[&a, &b]);

        assert_eq!(a.multiplayer.store().doc().ids(), ["e1", "r1"]);
        assert_eq!(b.multiplayer.store().doc().ids(), ["e1", "r1"]);
        assert_eq!(a.canvas.borrow().to_scene(), b.canvas.borrow().to_scene());
    }

    #[test]
    fn test_remote_changes_are_not_undone_locally() {
        let relay = LocalRelay::new();
        let a = Peer::join(&relay);
        let b = Peer::join(&relay);
        settle(&[&a, &b]);

        a.add(rect("r1", 0.0));
        settle(&[&a, &b]);
        assert!(!b.multiplayer.on_undo().unwrap());
        assert_eq!(b.ids(), ["r1"]);

        assert!(a.multiplayer.on_undo().unwrap());
        settle(&[&a, &b]);
        assert!(b.ids().is_empty());
    }

    #[test]
    fn test_rejected_scene_keeps_previous() {
        struct Stubborn(usize);
        impl Canvas for Stubborn {
            fn load_scene(&mut self, _scene: Scene) -> Result<(), CanvasError> {
                self.0 += 1;
                Err(CanvasError::InvalidScene("read-only".into()))
            }
            fn to_scene(&self) -> Scene {
                Scene::default()
            }
        }

        let (mp, _) = offline();
        let stubborn = Rc::new(RefCell::new(Stubborn(0)));
        mp.on_mount(stubborn.clone());
        assert!(!mp.reload());
        mp.on_change_page(vec![rect("a", 0.0)]).unwrap();
        assert_eq!(mp.store().doc().ids(), ["a"]);
        assert_eq!(stubborn.borrow().0, 3);
    }

    #[test]
    fn test_dispose_detaches() {
        let (mut mp, _) = offline();
        mp.dispose();
        assert!(mp.canvas().is_none());
        mp.on_change_page(vec![rect("a", 0.0)]).unwrap();
        assert_eq!(mp.store().doc().ids(), ["a"]);
        assert!(!mp.reload());
    }
}
