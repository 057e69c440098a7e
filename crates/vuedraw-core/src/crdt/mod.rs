//! CRDT integration using Loro for collaborative editing.
//!
//! # Schema
//!
//! ```text
//! LoroDoc
//! ├── "shapes": LoroMap<ShapeId, Value> (serialized shape entries)
//! └── "z_order": LoroList<String> (shape ids, back to front)
//! ```
//!
//! Local edits always clear and rewrite both containers in a single commit.

mod convert;
mod schema;

pub use convert::{json_to_loro, loro_to_json, shape_from_loro, shape_to_loro};
pub use schema::{ShapeDocument, SHAPES_KEY, Z_ORDER_KEY};

pub use loro::{Subscription, VersionVector};
