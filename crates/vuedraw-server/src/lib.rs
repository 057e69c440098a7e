//! vuedraw WebSocket Relay Server
//!
//! Relays document updates and awareness between clients in the same room.
//! Each room keeps a bounded history of sync payloads that is replayed to
//! new joiners.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "room": "y-vuedraw-1" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "awareness", "client_id": 123, "presence": { "name": "ada", "color": "#f00" } }
//! ```

pub mod rooms;
pub mod ws;

use axum::{Router, routing::get};
use rooms::Rooms;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Default)]
pub struct AppState {
    /// Active rooms
    pub rooms: Rooms,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build the relay router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "vuedraw Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
