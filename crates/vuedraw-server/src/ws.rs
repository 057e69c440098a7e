//! Per-connection WebSocket handling.

use crate::AppState;
use crate::rooms::RoomMessage;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;
use vuedraw_core::sync::{ClientMessage, ServerMessage, encode_payload};

type Sender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Errors mean the peer is gone.
async fn send_json(sender: &mut Sender, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

/// One peer's session: its room membership and broadcast subscription.
struct Session {
    peer_id: String,
    state: Arc<AppState>,
    room: Option<String>,
    room_rx: Option<broadcast::Receiver<RoomMessage>>,
}

impl Session {
    fn new(state: Arc<AppState>) -> Self {
        Self {
            peer_id: Uuid::new_v4().to_string(),
            state,
            room: None,
            room_rx: None,
        }
    }

    fn leave(&mut self) {
        if let Some(room) = self.room.take() {
            self.state.rooms.leave(&room, &self.peer_id);
            self.state.rooms.broadcast(
                &room,
                &self.peer_id,
                ServerMessage::PeerLeft {
                    peer_id: self.peer_id.clone(),
                },
            );
            info!("Peer {} left room {}", self.peer_id, room);
        }
        self.room_rx = None;
    }

    fn relay_sync(&self, data: String) {
        if let Some(ref room) = self.room {
            self.state.rooms.record_sync(room, data.clone());
            self.state.rooms.broadcast(
                room,
                &self.peer_id,
                ServerMessage::Sync {
                    from: self.peer_id.clone(),
                    data,
                },
            );
        }
    }

    /// Apply a client message. Returns a reply for the client, if any.
    fn handle(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Join { room } => {
                self.leave();
                let joined = self.state.rooms.join(&room, &self.peer_id);
                self.room_rx = Some(joined.rx);
                self.room = Some(room.clone());
                self.state.rooms.broadcast(
                    &room,
                    &self.peer_id,
                    ServerMessage::PeerJoined {
                        peer_id: self.peer_id.clone(),
                    },
                );
                info!("Peer {} joined room {} ({} peers)", self.peer_id, room, joined.peer_count);
                Some(ServerMessage::Joined {
                    room,
                    peer_count: joined.peer_count,
                    history: joined.history,
                })
            }
            ClientMessage::Leave => {
                self.leave();
                None
            }
            ClientMessage::Sync { data } => {
                self.relay_sync(data);
                None
            }
            ClientMessage::Awareness { client_id, presence } => {
                if let Some(ref room) = self.room {
                    self.state.rooms.broadcast(
                        room,
                        &self.peer_id,
                        ServerMessage::Awareness {
                            from: self.peer_id.clone(),
                            client_id,
                            presence,
                        },
                    );
                }
                None
            }
        }
    }

    /// Next message from the joined room, or never if not in a room.
    async fn next_broadcast(&mut self) -> Option<RoomMessage> {
        let Some(rx) = self.room_rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Peer {} lagged, skipped {} messages", self.peer_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut session = Session::new(state);
    info!("New connection: {}", session.peer_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => session.handle(client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", session.peer_id, e);
                                Some(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                })
                            }
                        };
                        if let Some(reply) = reply {
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    // Binary frames carry raw document bytes.
                    Some(Ok(Message::Binary(data))) => session.relay_sync(encode_payload(&data)),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", session.peer_id, e);
                        break;
                    }
                }
            }

            msg = session.next_broadcast() => {
                match msg {
                    // Don't echo back to sender
                    Some((from, _)) if from == session.peer_id => {}
                    Some((_, server_msg)) => {
                        if send_json(&mut sender, &server_msg).await.is_err() {
                            break;
                        }
                    }
                    None => session.room_rx = None,
                }
            }
        }
    }

    session.leave();
    info!("Connection closed: {}", session.peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(state: &Arc<AppState>) -> Session {
        Session::new(state.clone())
    }

    #[test]
    fn test_join_replies_with_history() {
        let state = Arc::new(AppState::new());
        let mut a = session(&state);
        a.handle(ClientMessage::Join { room: "r".into() });
        a.handle(ClientMessage::Sync { data: "AQ==".into() });

        let mut b = session(&state);
        let reply = b.handle(ClientMessage::Join { room: "r".into() });
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                room: "r".into(),
                peer_count: 2,
                history: vec!["AQ==".into()],
            })
        );
    }

    #[test]
    fn test_sync_outside_room_is_dropped() {
        let state = Arc::new(AppState::new());
        let mut a = session(&state);
        assert_eq!(a.handle(ClientMessage::Sync { data: "AQ==".into() }), None);
        assert_eq!(state.rooms.room_count(), 0);
    }

    #[test]
    fn test_switching_rooms_leaves_old_one() {
        let state = Arc::new(AppState::new());
        let mut a = session(&state);
        a.handle(ClientMessage::Join { room: "y-vuedraw-1".into() });
        a.handle(ClientMessage::Join { room: "y-vuedraw-2".into() });
        assert_eq!(state.rooms.peer_count("y-vuedraw-1"), 0);
        assert_eq!(state.rooms.peer_count("y-vuedraw-2"), 1);

        a.handle(ClientMessage::Leave);
        assert_eq!(state.rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_sees_sync_and_leave() {
        let state = Arc::new(AppState::new());
        let mut a = session(&state);
        let mut b = session(&state);
        a.handle(ClientMessage::Join { room: "r".into() });
        b.handle(ClientMessage::Join { room: "r".into() });

        a.handle(ClientMessage::Sync { data: "AQ==".into() });
        a.leave();

        // b's own join announcement is on the channel too.
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let (from, msg) = b.next_broadcast().await.unwrap();
            if from != b.peer_id {
                seen.push(msg);
            }
        }
        assert_eq!(seen[0], ServerMessage::Sync { from: a.peer_id.clone(), data: "AQ==".into() });
        assert_eq!(seen[1], ServerMessage::PeerLeft { peer_id: a.peer_id.clone() });
    }
}
