//! Canvas abstraction and an in-memory scene implementation.
//!
//! The rendering toolkit is outside this crate. All the sync layer needs is a
//! component that can serialize its scene to a plain object list and replace
//! the whole scene from one.

use crate::shapes::{ShapeEntry, ShapeId};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;

/// Shared handle to the mounted canvas.
pub type CanvasHandle = Rc<RefCell<dyn Canvas>>;

/// Scene load errors.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Duplicate shape id in scene: {0}")]
    DuplicateId(ShapeId),
    #[error("Invalid scene: {0}")]
    InvalidScene(String),
}

/// Plain object tree a canvas serializes to and loads from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub objects: Vec<ShapeEntry>,
}

impl Scene {
    pub fn new(objects: Vec<ShapeEntry>) -> Self {
        Self { objects }
    }

    /// Parse a scene from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, CanvasError> {
        serde_json::from_str(json).map_err(|e| CanvasError::InvalidScene(e.to_string()))
    }

    /// Serialize the scene to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A drawing surface that can be synchronized.
pub trait Canvas {
    /// Replace the entire scene.
    ///
    /// Implementations must not emit page-change notifications from here.
    fn load_scene(&mut self, scene: Scene) -> Result<(), CanvasError>;

    /// Serialize the current scene.
    fn to_scene(&self) -> Scene;
}

/// In-memory canvas holding the scene as an ordered object list.
///
/// Edit methods return the full post-edit object list, which is what a canvas
/// hands to `Multiplayer::on_change_page`.
#[derive(Debug, Default)]
pub struct SceneCanvas {
    objects: Vec<ShapeEntry>,
    loads: usize,
}

impl SceneCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects in scene order (back to front).
    pub fn objects(&self) -> &[ShapeEntry] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ShapeEntry> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Number of times the scene was replaced via [`Canvas::load_scene`].
    pub fn load_count(&self) -> usize {
        self.loads
    }

    /// Add an object on top of the scene.
    pub fn add(&mut self, shape: ShapeEntry) -> Vec<ShapeEntry> {
        self.objects.retain(|o| o.id != shape.id);
        self.objects.push(shape);
        self.objects.clone()
    }

    /// Remove an object. Returns `None` if it was not in the scene.
    pub fn remove(&mut self, id: &str) -> Option<Vec<ShapeEntry>> {
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        (self.objects.len() != before).then(|| self.objects.clone())
    }

    /// Modify an object in place. Returns `None` if it was not in the scene.
    pub fn modify(&mut self, id: &str, f: impl FnOnce(&mut ShapeEntry)) -> Option<Vec<ShapeEntry>> {
        let shape = self.objects.iter_mut().find(|o| o.id == id)?;
        f(shape);
        Some(self.objects.clone())
    }
}

impl Canvas for SceneCanvas {
    fn load_scene(&mut self, scene: Scene) -> Result<(), CanvasError> {
        let mut seen = HashSet::with_capacity(scene.objects.len());
        for object in &scene.objects {
            if !seen.insert(object.id.as_str()) {
                return Err(CanvasError::DuplicateId(object.id.clone()));
            }
        }
        self.objects = scene.objects;
        self.loads += 1;
        Ok(())
    }

    fn to_scene(&self) -> Scene {
        Scene::new(self.objects.clone())
    }
}
