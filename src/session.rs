//! Session struct definition
//!
//! Represents one connected client: its identity, its outbound mailbox and
//! the task that drains that mailbox onto the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ChatError, SendError};
use crate::message::{Outbound, HELP};
use crate::types::{SessionId, Tag};

/// Receiving end of a session's mailbox, owned by the drain task
pub type Mailbox = mpsc::UnboundedReceiver<String>;

/// Connected client
///
/// Shared as `Arc<Session>` between the registry, the read loop, the drain
/// task and the idle monitor.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer_addr: String,
    /// Display name; only rewritten by the registry under its write lock
    identity: RwLock<String>,
    /// `None` once the mailbox has been closed
    mailbox: Mutex<Option<mpsc::UnboundedSender<String>>>,
    torn_down: AtomicBool,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session whose identity defaults to its peer address
    ///
    /// Returns the mailbox receiver; nothing drains it until it is handed to
    /// a drain task (see [`Session::create`]).
    pub fn new(peer_addr: impl Into<String>) -> (Arc<Self>, Mailbox) {
        let peer_addr = peer_addr.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::new(),
            identity: RwLock::new(peer_addr.clone()),
            peer_addr,
            mailbox: Mutex::new(Some(tx)),
            torn_down: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        (session, rx)
    }

    /// Create a session and spawn the task draining its mailbox to `writer`
    ///
    /// The drain task ends when the mailbox is closed and empty, or on the
    /// first failed or timed-out write, in which case it cancels the session.
    pub fn create<W>(
        writer: W,
        peer_addr: impl Into<String>,
        write_timeout: Duration,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (session, mailbox) = Self::new(peer_addr);
        let cancel = session.cancel.clone();
        let id = session.id;
        let drain = tokio::spawn(async move {
            if let Err(e) = drain_mailbox(mailbox, writer, write_timeout).await {
                warn!("Write to session {} failed: {}", id, e);
            }
            debug!("Drain task ended for {}", id);
            cancel.cancel();
        });
        (session, drain)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Current display identity
    pub fn identity(&self) -> String {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_identity(&self, identity: String) {
        *self.identity.write().unwrap_or_else(|e| e.into_inner()) = identity;
    }

    /// Enqueue `[tag]body`
    pub fn send(&self, tag: Tag, body: impl Into<String>) -> Result<(), SendError> {
        self.deliver(Outbound::new(tag, body))
    }

    /// Enqueue an already-built outbound line
    pub fn deliver(&self, msg: Outbound) -> Result<(), SendError> {
        self.push(msg.to_string())
    }

    /// Enqueue a line that already carries its tag
    pub fn push(&self, line: String) -> Result<(), SendError> {
        let mailbox = self.mailbox.lock().unwrap_or_else(|e| e.into_inner());
        match mailbox.as_ref() {
            Some(tx) => tx.send(line).map_err(|_| SendError::MailboxClosed),
            None => Err(SendError::MailboxClosed),
        }
    }

    /// Enqueue the onboarding instructions
    pub fn send_help(&self) -> Result<(), SendError> {
        for line in HELP {
            self.send(Tag::System, line)?;
        }
        Ok(())
    }

    /// Close the mailbox; queued lines are still drained
    ///
    /// Returns false if it was already closed.
    pub fn close_mailbox(&self) -> bool {
        self.mailbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    pub fn is_mailbox_closed(&self) -> bool {
        self.mailbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Claim the right to tear this session down
    ///
    /// Only the first caller gets `true`.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Signal the read loop and idle monitor to stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the session must stop reading
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Write each mailbox item as one line until the mailbox is closed and empty
async fn drain_mailbox<W>(
    mut mailbox: Mailbox,
    writer: W,
    write_timeout: Duration,
) -> Result<(), ChatError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    while let Some(line) = mailbox.recv().await {
        match tokio::time::timeout(write_timeout, sink.send(line)).await {
            Ok(result) => result?,
            Err(_) => return Err(ChatError::WriteTimeout),
        }
    }

    match tokio::time::timeout(write_timeout, SinkExt::<String>::close(&mut sink)).await {
        Ok(result) => result?,
        Err(_) => return Err(ChatError::WriteTimeout),
    }
    Ok(())
}
