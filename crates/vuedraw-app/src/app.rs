//! Application shell: configuration, page mounting and the terminal loop.

use crate::commands::{Command, CommandError, HELP};
use crate::router::{BASE_URL, Page, ROUTES, Router};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use vuedraw_core::sync::LocalRelay;
use vuedraw_core::{
    ConnectionState, DEFAULT_RELAY_URL, DocumentStore, Multiplayer, PresenceRecord, SceneCanvas,
    StoreConfig, SyncError, SyncEvent, Users, VERSION, use_multiplayer, use_users,
};

/// How often the transport is polled while waiting for input.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("No shape matches {0:?}")]
    UnknownShape(String),
    #[error("{0:?} matches more than one shape")]
    AmbiguousShape(String),
    #[error("Open the board first (`open /`)")]
    NotOnBoard,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub relay_url: String,
    pub name: String,
    pub color: String,
    pub version: u32,
    /// Use an in-process relay instead of the network.
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            relay_url: DEFAULT_RELAY_URL.to_string(),
            name: "anonymous".to_string(),
            color: "#1e88e5".to_string(),
            version: VERSION,
            offline: false,
        }
    }
}

impl AppConfig {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            relay_url: self.relay_url.clone(),
            version: self.version,
            ..Default::default()
        }
    }
}

/// Whether the loop keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Main application struct.
pub struct App {
    config: AppConfig,
    router: Router,
    page: Page,
    multiplayer: Multiplayer,
    users: Users,
    canvas: Rc<RefCell<SceneCanvas>>,
    last_state: ConnectionState,
}

impl App {
    /// Build the store for `config` and mount the page at `path`.
    pub fn mount(config: AppConfig, path: &str) -> Result<Self, AppError> {
        let store_config = config.store_config();
        let store = if config.offline {
            let room = store_config.room_id();
            log::info!("Offline mode, using an in-process relay");
            DocumentStore::with_transport(room.clone(), Box::new(LocalRelay::new().connect(&room)))
        } else {
            DocumentStore::connect(&store_config)?
        };
        Ok(Self::mount_with_store(config, path, store))
    }

    /// Mount the page at `path` over an existing store.
    pub fn mount_with_store(config: AppConfig, path: &str, store: DocumentStore) -> Self {
        let router = Router::new(&config.base_url, ROUTES);
        let store = Rc::new(store);
        let multiplayer = use_multiplayer(store.clone());
        let users = use_users(&store, PresenceRecord::new(config.name.clone(), config.color.clone()));
        let last_state = store.connection_state();

        let mut app = Self {
            config,
            router,
            page: Page::NotFound,
            multiplayer,
            users,
            canvas: Rc::new(RefCell::new(SceneCanvas::new())),
            last_state,
        };
        app.navigate(path);
        app
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn canvas(&self) -> &Rc<RefCell<SceneCanvas>> {
        &self.canvas
    }

    pub fn multiplayer(&self) -> &Multiplayer {
        &self.multiplayer
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    /// Show the page for `path`; the board mounts the canvas.
    pub fn navigate(&mut self, path: &str) -> Page {
        self.page = self.router.resolve(path);
        if self.page == Page::Board && self.multiplayer.canvas().is_none() {
            self.multiplayer.on_mount(self.canvas.clone());
        }
        log::debug!("Navigated to {} ({:?})", path, self.page);
        self.page
    }

    /// Print the current page.
    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        match self.page {
            Page::Board => {
                let count = self.canvas.borrow().len();
                writeln!(out, "Board {} ({} shapes). Type `help` for commands.", self.multiplayer.store().room_id(), count)
            }
            Page::About => writeln!(
                out,
                "vuedraw {}: a shared whiteboard. Edits sync to everyone in room {}.",
                env!("CARGO_PKG_VERSION"),
                self.multiplayer.store().room_id()
            ),
            Page::NotFound => writeln!(out, "Page not found. Try `open {}`.", self.router.base()),
        }
    }

    fn prompt(&self, out: &mut impl Write) -> io::Result<()> {
        write!(out, "[{}] vuedraw> ", self.multiplayer.store().connection_state().label())?;
        out.flush()
    }

    /// Find a shape id by 1-based list index, exact id or unique id prefix.
    fn resolve_shape(&self, target: &str) -> Result<String, AppError> {
        let canvas = self.canvas.borrow();
        let objects = canvas.objects();
        if let Ok(index) = target.parse::<usize>() {
            if let Some(shape) = index.checked_sub(1).and_then(|i| objects.get(i)) {
                return Ok(shape.id.clone());
            }
        }
        if objects.iter().any(|o| o.id == target) {
            return Ok(target.to_string());
        }
        let mut matches = objects.iter().filter(|o| o.id.starts_with(target));
        match (matches.next(), matches.next()) {
            (Some(shape), None) => Ok(shape.id.clone()),
            (Some(_), Some(_)) => Err(AppError::AmbiguousShape(target.to_string())),
            (None, _) => Err(AppError::UnknownShape(target.to_string())),
        }
    }

    fn require_board(&self) -> Result<(), AppError> {
        if self.page == Page::Board {
            Ok(())
        } else {
            Err(AppError::NotOnBoard)
        }
    }

    /// Run one command.
    pub fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<Flow, AppError> {
        match command {
            Command::Draw(shape) => {
                self.require_board()?;
                let label = shape.to_string();
                let objects = self.canvas.borrow_mut().add(shape);
                self.multiplayer.on_change_page(objects)?;
                writeln!(out, "added {}", label)?;
            }
            Command::Delete(target) => {
                self.require_board()?;
                let id = self.resolve_shape(&target)?;
                let objects = self.canvas.borrow_mut().remove(&id);
                if let Some(objects) = objects {
                    self.multiplayer.on_change_page(objects)?;
                    writeln!(out, "deleted {}", id)?;
                }
            }
            Command::Move { target, delta } => {
                self.require_board()?;
                let id = self.resolve_shape(&target)?;
                let mut moved = false;
                let objects = self.canvas.borrow_mut().modify(&id, |shape| moved = shape.translate(delta));
                match objects {
                    Some(objects) if moved => {
                        self.multiplayer.on_change_page(objects)?;
                        writeln!(out, "moved {}", id)?;
                    }
                    _ => writeln!(out, "{} has no position", id)?,
                }
            }
            Command::Undo => {
                self.require_board()?;
                let applied = self.multiplayer.on_undo()?;
                writeln!(out, "{}", if applied { "undone" } else { "nothing to undo" })?;
            }
            Command::Redo => {
                self.require_board()?;
                let applied = self.multiplayer.on_redo()?;
                writeln!(out, "{}", if applied { "redone" } else { "nothing to redo" })?;
            }
            Command::List => {
                self.require_board()?;
                let canvas = self.canvas.borrow();
                if canvas.is_empty() {
                    writeln!(out, "(empty board)")?;
                }
                for (i, shape) in canvas.objects().iter().enumerate() {
                    writeln!(out, "{:>3}  {}", i + 1, shape)?;
                }
            }
            Command::Users => {
                if let Some(me) = self.users.room.presence() {
                    writeln!(out, "  {} {} (you)", me.color, me.name)?;
                }
                for user in self.users.others.get() {
                    writeln!(out, "  {} {}", user.color, user.name)?;
                }
            }
            Command::Status => {
                let store = self.multiplayer.store();
                writeln!(
                    out,
                    "{} | room {} | relay {} | {} shape(s) | {} other user(s)",
                    store.connection_state().label(),
                    store.room_id(),
                    if self.config.offline { "in-process" } else { self.config.relay_url.as_str() },
                    store.doc().shape_count(),
                    self.users.others.with(Vec::len),
                )?;
            }
            Command::Name(name) => {
                self.users.room.update_presence(|p| p.name = name);
                self.multiplayer.store().flush_awareness();
            }
            Command::Color(color) => {
                self.users.room.update_presence(|p| p.color = color);
                self.multiplayer.store().flush_awareness();
            }
            Command::Open(path) => {
                self.navigate(&path);
                self.render(out)?;
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Poll the relay and report what changed.
    pub fn tick(&mut self, out: &mut impl Write) -> Result<(), AppError> {
        let loads = self.canvas.borrow().load_count();
        let events = self.multiplayer.tick()?;

        for event in &events {
            match event {
                SyncEvent::PeerJoined { .. } => writeln!(out, "* someone joined")?,
                SyncEvent::PeerLeft { .. } => writeln!(out, "* someone left")?,
                SyncEvent::Error { message } => writeln!(out, "* relay error: {}", message)?,
                _ => {}
            }
        }

        let state = self.multiplayer.store().connection_state();
        if state != self.last_state {
            writeln!(out, "* {}", state.label())?;
            self.last_state = state;
        }
        if self.page == Page::Board && self.canvas.borrow().load_count() != loads {
            writeln!(out, "* board updated ({} shapes)", self.canvas.borrow().len())?;
        }
        Ok(())
    }

    /// Read commands from stdin until `quit` or end of input.
    pub fn run(&mut self) -> Result<(), AppError> {
        let (line_tx, line_rx) = mpsc::channel::<String>();
        thread::Builder::new().name("vuedraw-stdin".into()).spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.render(&mut out)?;
        self.prompt(&mut out)?;

        loop {
            match line_rx.recv_timeout(TICK_INTERVAL) {
                Ok(line) => {
                    let flow = match Command::parse(&line) {
                        Ok(Some(command)) => self.execute(command, &mut out),
                        Ok(None) => Ok(Flow::Continue),
                        Err(e) => Err(e.into()),
                    };
                    match flow {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(AppError::Io(e)) => return Err(AppError::Io(e)),
                        Err(e) => writeln!(out, "error: {}", e)?,
                    }
                    self.prompt(&mut out)?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Err(e) = self.tick(&mut out) {
                log::warn!("Sync failed: {}", e);
            }
        }

        self.multiplayer.dispose();
        writeln!(out, "bye")?;
        Ok(())
    }
}
