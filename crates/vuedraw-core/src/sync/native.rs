//! Native WebSocket provider.
//!
//! The socket lives on a background thread; the UI thread talks to it through
//! two channels (commands in, events out). The thread connects immediately,
//! joins the room, and reconnects with capped exponential backoff whenever the
//! connection drops, re-joining the room each time.

use super::{ClientMessage, ConnectionState, ServerMessage, SyncError, SyncEvent, Transport};
use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket, connect};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(2500);
const READ_TIMEOUT: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// How a connected session ended.
enum SessionEnd {
    /// Close was requested locally; stop for good.
    Closed,
    /// The connection dropped; reconnect.
    Dropped,
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// WebSocket provider for native platforms.
pub struct NativeWebSocket {
    state: ConnectionState,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<SyncEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    /// Start connecting to `url` and join `room` once connected.
    ///
    /// Returns as soon as the background thread is started; messages sent
    /// before the connection is up are buffered and flushed after the join.
    pub fn connect(url: &str, room: &str) -> Result<Self, SyncError> {
        let parsed = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(SyncError::InvalidUrl(format!("unsupported scheme: {}", parsed.scheme())));
        }
        if parsed.scheme() == "wss" {
            // Fails harmlessly when a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<SyncEvent>();
        let url = parsed.to_string();
        let room = room.to_string();

        let handle = thread::Builder::new()
            .name("vuedraw-ws".into())
            .spawn(move || run(&url, &room, &cmd_rx, &event_tx))
            .map_err(|e| SyncError::Send(e.to_string()))?;

        Ok(Self {
            state: ConnectionState::Connecting,
            cmd_tx: Some(cmd_tx),
            event_rx: Some(event_rx),
            _thread: Some(handle),
        })
    }
}

impl Transport for NativeWebSocket {
    fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
        let json = serde_json::to_string(msg)?;
        match self.cmd_tx {
            Some(ref tx) => tx
                .send(WsCommand::Send(json))
                .map_err(|e| SyncError::Send(e.to_string())),
            None => Err(SyncError::NotConnected),
        }
    }

    fn poll_events(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Connecting,
                    SyncEvent::Error { .. } if self.state != ConnectionState::Connected => {
                        self.state = ConnectionState::Error
                    }
                    _ => {}
                }
                events.push(event);
            }
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Thread body: connect, run a session, back off, repeat.
fn run(url: &str, room: &str, cmd_rx: &Receiver<WsCommand>, event_tx: &Sender<SyncEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    let mut pending: VecDeque<String> = VecDeque::new();

    loop {
        log::info!("WebSocket thread: connecting to {}", url);
        match connect(url) {
            Ok((mut socket, response)) => {
                log::info!("WebSocket connected, status: {}", response.status());
                backoff = INITIAL_BACKOFF;
                configure_timeouts(&socket);
                let _ = event_tx.send(SyncEvent::Connected);

                let end = session(&mut socket, room, cmd_rx, event_tx, &mut pending);
                let _ = event_tx.send(SyncEvent::Disconnected);
                if let SessionEnd::Closed = end {
                    log::info!("WebSocket thread exiting");
                    return;
                }
            }
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
            }
        }

        // Wait out the backoff, still accepting commands.
        let deadline = Instant::now() + backoff;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match cmd_rx.recv_timeout(deadline - now) {
                Ok(WsCommand::Send(msg)) => pending.push_back(msg),
                Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
        log::debug!("WebSocket reconnecting (next backoff {:?})", backoff);
    }
}

fn configure_timeouts(socket: &Socket) {
    let tcp = match socket.get_ref() {
        MaybeTlsStream::Plain(tcp) => tcp,
        MaybeTlsStream::Rustls(tls) => &tls.sock,
        _ => {
            log::debug!("Unknown stream type - using default timeout handling");
            return;
        }
    };
    let _ = tcp.set_read_timeout(Some(READ_TIMEOUT));
    let _ = tcp.set_write_timeout(Some(WRITE_TIMEOUT));
}

/// Drive one connected session until it closes or drops.
fn session(
    socket: &mut Socket,
    room: &str,
    cmd_rx: &Receiver<WsCommand>,
    event_tx: &Sender<SyncEvent>,
    pending: &mut VecDeque<String>,
) -> SessionEnd {
    let join = ClientMessage::Join { room: room.to_string() };
    match serde_json::to_string(&join) {
        Ok(json) => pending.push_front(json),
        Err(e) => log::error!("Failed to encode join: {}", e),
    }

    while let Some(msg) = pending.pop_front() {
        if let Err(e) = socket.send(Message::Text(msg.clone())) {
            log::error!("WebSocket send error: {}", e);
            pending.push_front(msg);
            return SessionEnd::Dropped;
        }
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", &msg[..msg.len().min(100)]);
                if let Err(e) = socket.send(Message::Text(msg.clone())) {
                    log::error!("WebSocket send error: {}", e);
                    pending.push_back(msg);
                    return SessionEnd::Dropped;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                let _ = socket.flush();
                return SessionEnd::Closed;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                let _ = socket.close(None);
                return SessionEnd::Closed;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => {
                log::debug!("WebSocket received: {}", &txt[..txt.len().min(100)]);
                match serde_json::from_str::<ServerMessage>(&txt) {
                    Ok(msg) => {
                        if let Some(event) = SyncEvent::from_server_message(msg) {
                            let _ = event_tx.send(event);
                        }
                    }
                    Err(e) => log::warn!("Failed to parse server message: {}", e),
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                return SessionEnd::Dropped;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                return SessionEnd::Dropped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_rejects_non_websocket_url() {
        let result = NativeWebSocket::connect("http://localhost:3030/ws", "room");
        assert!(matches!(result, Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_garbage_url() {
        assert!(matches!(NativeWebSocket::connect("not a url", "room"), Err(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_secure_url_starts_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut ws = NativeWebSocket::connect(&format!("wss://127.0.0.1:{port}/ws"), "room").unwrap();
        assert_eq!(ws.state(), ConnectionState::Connecting);

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut record_type = [0u8; 1];
        stream.read_exact(&mut record_type).unwrap();
        // 0x16: TLS handshake record (ClientHello).
        assert_eq!(record_type[0], 0x16);

        drop(stream);
        drop(listener);
        ws.disconnect();
        assert_eq!(ws.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_before_connected() {
        // Nothing listens on port 9; the thread keeps retrying until closed.
        let mut ws = NativeWebSocket::connect("ws://127.0.0.1:9/ws", "room").unwrap();
        assert_eq!(ws.state(), ConnectionState::Connecting);
        ws.send(&ClientMessage::Leave).unwrap();
        ws.disconnect();
        assert_eq!(ws.state(), ConnectionState::Disconnected);
        assert!(matches!(ws.send(&ClientMessage::Leave), Err(SyncError::NotConnected)));
    }
}
