//! Main application entry point.

use clap::Parser;
use std::process::ExitCode;
use vuedraw_app::{App, AppConfig};
use vuedraw_core::{DEFAULT_RELAY_URL, VERSION};

const PALETTE: &[&str] = &["#e53935", "#8e24aa", "#1e88e5", "#00897b", "#7cb342", "#fb8c00"];

/// Collaborative whiteboard in the terminal.
#[derive(Debug, Parser)]
#[command(name = "vuedraw", version, about)]
struct Cli {
    /// Relay server WebSocket URL
    #[arg(long, default_value = DEFAULT_RELAY_URL)]
    relay: String,

    /// Name shown to other users
    #[arg(long, env = "USER", default_value = "anonymous")]
    name: String,

    /// Color shown to other users (defaults to one picked from a palette)
    #[arg(long)]
    color: Option<String>,

    /// Document version; clients on different versions never meet
    #[arg(long, default_value_t = VERSION)]
    room_version: u32,

    /// Page to open
    #[arg(long, default_value = "/")]
    path: String,

    /// Work without a relay server
    #[arg(long)]
    offline: bool,
}

impl Cli {
    fn config(&self) -> AppConfig {
        let color = self
            .color
            .clone()
            .unwrap_or_else(|| PALETTE[std::process::id() as usize % PALETTE.len()].to_string());
        AppConfig {
            relay_url: self.relay.clone(),
            name: self.name.clone(),
            color,
            version: self.room_version,
            offline: self.offline,
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("Starting vuedraw");

    match App::mount(cli.config(), &cli.path).and_then(|mut app| app.run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("vuedraw: {}", e);
            ExitCode::FAILURE
        }
    }
}
