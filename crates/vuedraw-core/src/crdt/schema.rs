//! Loro document schema and operations.

use super::convert::{shape_from_loro, shape_to_loro};
use crate::shapes::{ShapeEntry, ShapeId};
use crate::sync::SyncError;
use loro::event::DiffEvent;
use loro::{
    ContainerTrait, ExportMode, LoroDoc, LoroList, LoroMap, LoroResult, LoroValue, Subscription,
    UndoManager, ValueOrContainer, VersionVector,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Key for the shapes map in the document.
pub const SHAPES_KEY: &str = "shapes";
/// Key for the z-order list in the document.
pub const Z_ORDER_KEY: &str = "z_order";

/// Maximum number of undo steps kept.
const MAX_UNDO_STEPS: usize = 100;

/// A CRDT-backed shape map with local undo/redo.
///
/// The `shapes` map holds one plain value per shape, keyed by shape id. The
/// `z_order` list holds the ids in scene order and is what gives the map a
/// deterministic iteration order across peers.
pub struct ShapeDocument {
    doc: LoroDoc,
    undo_manager: UndoManager,
}

impl ShapeDocument {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::from_doc(LoroDoc::new())
    }

    /// Create a document from a snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> LoroResult<Self> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self::from_doc(doc))
    }

    fn from_doc(doc: LoroDoc) -> Self {
        let mut undo_manager = UndoManager::new(&doc);
        undo_manager.set_max_undo_steps(MAX_UNDO_STEPS);
        // Every page change is its own undo step.
        undo_manager.set_merge_interval(0);
        Self { doc, undo_manager }
    }

    /// Peer id of this replica.
    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    fn shapes_map(&self) -> LoroMap {
        self.doc.get_map(SHAPES_KEY)
    }

    fn z_order_list(&self) -> LoroList {
        self.doc.get_list(Z_ORDER_KEY)
    }

    /// Number of entries in the shapes map.
    pub fn shape_count(&self) -> usize {
        self.shapes_map().len()
    }

    /// Whether the shapes map has an entry for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.shapes_map().get(id).is_some()
    }

    /// Keys of the shapes map, sorted.
    pub fn ids(&self) -> Vec<ShapeId> {
        let mut ids = match self.shapes_map().get_value() {
            LoroValue::Map(map) => map.keys().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        ids.sort();
        ids
    }

    /// The z-order as stored, possibly with duplicates after concurrent rewrites.
    pub fn z_order(&self) -> Vec<ShapeId> {
        let list = self.z_order_list();
        let mut result = Vec::with_capacity(list.len());
        for i in 0..list.len() {
            if let Some(ValueOrContainer::Value(LoroValue::String(id))) = list.get(i) {
                result.push(id.to_string());
            }
        }
        result
    }

    /// Get a shape by id.
    pub fn get_shape(&self, id: &str) -> Option<ShapeEntry> {
        match self.shapes_map().get(id)? {
            ValueOrContainer::Value(value) => shape_from_loro(&value),
            ValueOrContainer::Container(_) => None,
        }
    }

    /// All shapes in scene order.
    ///
    /// Ids follow the z-order list (first occurrence wins); map entries the
    /// list does not mention are appended in key order. Malformed entries are
    /// skipped.
    pub fn shapes(&self) -> Vec<ShapeEntry> {
        let LoroValue::Map(map) = self.shapes_map().get_value() else {
            return Vec::new();
        };

        let mut seen = HashSet::with_capacity(map.len());
        let mut ordered: Vec<ShapeId> = self
            .z_order()
            .into_iter()
            .filter(|id| map.contains_key(id.as_str()) && seen.insert(id.clone()))
            .collect();

        let mut rest: Vec<ShapeId> = map.keys().filter(|k| !seen.contains(*k)).cloned().collect();
        rest.sort();
        ordered.extend(rest);

        ordered
            .iter()
            .filter_map(|id| map.get(id.as_str()).and_then(shape_from_loro))
            .collect()
    }

    /// Clear the shape map and rewrite it from `objects` in one commit.
    ///
    /// A new undo checkpoint is recorded first so the rewrite never merges
    /// into the previous undo step. If an id appears more than once, the last
    /// occurrence wins and takes that position in the z-order.
    pub fn replace_all(&mut self, objects: &[ShapeEntry]) -> Result<(), SyncError> {
        let mut seen = HashSet::with_capacity(objects.len());
        let mut unique: Vec<&ShapeEntry> = objects
            .iter()
            .rev()
            .filter(|o| seen.insert(o.id.as_str()))
            .collect();
        unique.reverse();

        let mut values = Vec::with_capacity(unique.len());
        for shape in unique {
            values.push((shape.id.as_str(), shape_to_loro(shape)?));
        }

        self.undo_manager.record_new_checkpoint()?;

        let shapes = self.shapes_map();
        let z_order = self.z_order_list();
        shapes.clear()?;
        z_order.clear()?;
        for (id, value) in values {
            shapes.insert(id, value)?;
            z_order.push(id)?;
        }

        self.doc.commit();
        Ok(())
    }

    /// Subscribe to any change of the shapes map, local or imported.
    ///
    /// Dropping the returned subscription unsubscribes.
    pub fn subscribe_shapes(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        let shapes = self.shapes_map();
        self.doc
            .subscribe(&shapes.id(), Arc::new(move |_event: DiffEvent<'_>| callback()))
    }

    // --- Network Sync ---

    /// Export the document as a snapshot (full state).
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> Vec<u8> {
        self.doc.export(ExportMode::updates(since)).unwrap_or_default()
    }

    /// Import updates or a snapshot from another peer.
    pub fn import(&mut self, bytes: &[u8]) -> LoroResult<()> {
        self.doc.import(bytes)?;
        Ok(())
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    // --- Undo/Redo API ---

    /// Undo the last local change.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.undo_manager.undo().unwrap_or(false)
    }

    /// Redo the last undone change.
    pub fn redo(&mut self) -> bool {
        self.undo_manager.redo().unwrap_or(false)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_manager.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_manager.can_redo()
    }

    pub fn redo_count(&self) -> usize {
        self.undo_manager.redo_count()
    }
}

impl Default for ShapeDocument {
    fn default() -> Self {
        Self::new()
    }
}
