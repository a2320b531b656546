//! Line Chat Server - Entry Point
//!
//! Parses the command line, starts the ChatServer and accepts connections.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat_server::{handle_connection, ChatServer, Config};

#[derive(Debug, Parser)]
#[command(version, about = "Line-oriented TCP chat server")]
struct Args {
    /// Address to listen on (overrides the config file)
    addr: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds of silence before a session is evicted
    #[arg(long)]
    idle_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("line_chat_server=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(addr) = args.addr {
        config.bind_addr = addr;
    }
    if let Some(secs) = args.idle_timeout {
        config.idle_timeout_secs = secs;
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Chat server listening on {}", config.bind_addr);

    let server = ChatServer::start(config);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let server = server.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, server).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
