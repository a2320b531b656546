//! Line Chat Server Library
//!
//! A TCP chat server speaking plain newline-delimited text. Every client
//! joins one shared hall, can see who is online, rename itself and send
//! private messages.
//!
//! # Commands
//! - `who` lists online users
//! - `rename|{name}` changes your display name
//! - `to|{name}|{message}` sends a private message
//! - anything else is said in the hall
//!
//! # Architecture
//! - `Registry` maps identities to sessions behind a single read/write lock
//! - `BroadcastBus` is one ordered queue drained by a single fan-out task
//! - Each connection runs a read loop, a mailbox drain task and an
//!   idle monitor; sessions are torn down exactly once
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use line_chat_server::{handle_connection, ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8888").await.unwrap();
//!     let server = ChatServer::start(Config::default());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, server.clone()));
//!     }
//! }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod idle;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use bus::BroadcastBus;
pub use config::Config;
pub use error::{ChatError, SendError};
pub use handler::{handle_connection, serve};
pub use idle::{IdleMonitor, IdleState};
pub use message::{Command, Outbound};
pub use registry::Registry;
pub use server::ChatServer;
pub use session::Session;
pub use types::{SessionId, Tag};
