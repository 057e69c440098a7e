//! vuedraw Core Library
//!
//! Shared document store, canvas synchronization and presence for the
//! vuedraw collaborative whiteboard.

pub mod awareness;
pub mod canvas;
pub mod crdt;
pub mod multiplayer;
pub mod presence;
pub mod shapes;
pub mod state;
pub mod store;
pub mod sync;

pub use awareness::{AwarenessHandle, Cursor, PresenceRecord};
pub use canvas::{Canvas, CanvasError, CanvasHandle, Scene, SceneCanvas};
pub use crdt::ShapeDocument;
pub use multiplayer::{Multiplayer, use_multiplayer};
pub use presence::{PresenceRoom, Unsubscribe, Users, use_users};
pub use shapes::{ShapeEntry, ShapeId, ShapeKind};
pub use state::{Setter, State, use_state};
pub use store::{DocumentStore, StoreConfig, DEFAULT_RELAY_URL, ROOM_PREFIX, VERSION};
pub use sync::{ConnectionState, SyncError, SyncEvent, Transport};
