//! Error types for the chat server
//!
//! Defines application-level errors and mailbox send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both connection faults (session teardown) and
/// command errors (reported back to the requester as a system notice).
#[derive(Debug, Error)]
pub enum ChatError {
    /// Identity is already held by another online session
    #[error("Name already taken: {0}")]
    NameConflict(String),

    /// No online session with the given identity
    #[error("User not found: {0}")]
    NotFound(String),

    /// `to|` or `rename|` line that does not fit the expected shape
    #[error("Malformed command, expected {usage}")]
    MalformedCommand { usage: &'static str },

    /// Line or private message without content
    #[error("Empty message")]
    EmptyContent,

    /// IO error on the connection (fatal to the session)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error on the connection
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// A write to the connection did not complete in time
    #[error("Write timed out")]
    WriteTimeout,

    /// The broadcast fan-out task has stopped
    #[error("Broadcast bus closed")]
    BusClosed,

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Mailbox send errors
///
/// Occurs when enqueueing to a session that has already been torn down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's mailbox has been closed
    #[error("Mailbox closed")]
    MailboxClosed,
}
