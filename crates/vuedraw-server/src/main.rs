use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use vuedraw_server::{AppState, app};

/// WebSocket relay for vuedraw whiteboards.
#[derive(Debug, Parser)]
#[command(name = "vuedraw-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3030")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vuedraw_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(AppState::new());

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!("vuedraw relay server listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, app(state)).await
}
