//! ChatServer implementation
//!
//! Owns the registry and the broadcast bus, routes parsed commands to their
//! effects and runs the online/offline lifecycle of every session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::BroadcastBus;
use crate::config::Config;
use crate::error::ChatError;
use crate::message::{Command, Outbound, IDLE_TIMEOUT, OFFLINE, ONLINE, PRESENT};
use crate::registry::Registry;
use crate::session::Session;
use crate::types::Tag;

/// Shared chat state
///
/// Sessions hold an `Arc<ChatServer>` as a capability to reach the registry
/// and the bus; the server outlives every session it tracks.
#[derive(Debug)]
pub struct ChatServer {
    registry: Arc<Registry>,
    bus: BroadcastBus,
    config: Config,
}

impl ChatServer {
    /// Create the server and start the broadcast fan-out task
    pub fn start(config: Config) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let (bus, _fan_out) = BroadcastBus::start(Arc::clone(&registry), config.bus_capacity);
        info!("ChatServer started");
        Self::from_parts(registry, bus, config)
    }

    /// Assemble a server around an existing registry and bus
    pub fn from_parts(registry: Arc<Registry>, bus: BroadcastBus, config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry,
            bus,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn bus(&self) -> &BroadcastBus {
        &self.bus
    }

    /// Register a new session, announce it and send it the help text
    ///
    /// If the peer-address identity is taken, the session id is appended to
    /// make it unique. If the announcement fails the session is removed
    /// again before the error is returned.
    pub async fn online(&self, session: &Arc<Session>) -> Result<(), ChatError> {
        match self.registry.register(Arc::clone(session)).await {
            Ok(()) => {}
            Err(ChatError::NameConflict(name)) => {
                let fallback = format!("{}#{}", session.peer_addr(), session.id().short());
                warn!("Identity {} already online, using {}", name, fallback);
                session.set_identity(fallback);
                self.registry.register(Arc::clone(session)).await?;
            }
            Err(e) => return Err(e),
        }

        let identity = session.identity();
        info!("Session {} online as {}", session.id(), identity);

        if let Err(e) = self.bus.announce(Tag::System, &identity, ONLINE).await {
            self.registry.remove_session(session).await;
            return Err(e);
        }
        let _ = session.send_help();
        Ok(())
    }

    /// Execute one inbound line on behalf of `session`
    ///
    /// Lines from a session that is already torn down are dropped.
    pub async fn dispatch(&self, session: &Arc<Session>, line: &str) {
        if session.is_torn_down() {
            debug!("Dropping line from torn-down session {}", session.id());
            return;
        }

        let result = match Command::parse(line) {
            Command::Who => {
                self.handle_who(session).await;
                Ok(())
            }
            Command::Rename { name } => self.handle_rename(session, &name).await,
            Command::Direct { target, body } => self.handle_direct(session, &target, &body).await,
            Command::Empty => Err(ChatError::EmptyContent),
            Command::Chat { content } => self.handle_chat(session, &content).await,
            Command::Malformed { usage } => Err(ChatError::MalformedCommand { usage }),
        };

        if let Err(e) = result {
            debug!("Command from {} rejected: {}", session.id(), e);
            let _ = session.deliver(e.into());
        }
    }

    /// Normal disconnect or connection fault
    pub async fn offline(&self, session: &Arc<Session>) -> bool {
        self.teardown(session, None).await
    }

    /// Idle timeout
    pub async fn evict(&self, session: &Arc<Session>) -> bool {
        self.teardown(session, Some(IDLE_TIMEOUT)).await
    }

    /// Send the requester one presence line per online session
    async fn handle_who(&self, session: &Session) {
        self.registry
            .for_each(|identity, _| {
                let _ = session.send(Tag::System, format!("{}:{}", identity, PRESENT));
            })
            .await;
    }

    async fn handle_rename(&self, session: &Session, name: &str) -> Result<(), ChatError> {
        let current = session.identity();
        self.registry.rename(session, name).await?;
        info!("Session {} renamed {} -> {}", session.id(), current, name);

        let _ = session.deliver(Outbound::renamed(name));
        Ok(())
    }

    /// Private message, delivered straight to the target's mailbox
    async fn handle_direct(
        &self,
        session: &Session,
        target: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        let recipient = self.registry.lookup(target).await?;
        if body.is_empty() {
            return Err(ChatError::EmptyContent);
        }

        recipient
            .deliver(Outbound::private(&session.identity(), body))
            .map_err(|_| ChatError::NotFound(target.to_string()))
    }

    async fn handle_chat(&self, session: &Session, content: &str) -> Result<(), ChatError> {
        self.bus
            .announce(Tag::Hall, &session.identity(), content)
            .await
    }

    /// Remove the session, announce it, close its mailbox and stop its tasks
    ///
    /// Runs at most once per session; later calls return false.
    async fn teardown(&self, session: &Arc<Session>, notice: Option<&str>) -> bool {
        if !session.begin_teardown() {
            debug!("Session {} already torn down", session.id());
            return false;
        }

        if self.registry.remove_session(session).await {
            let identity = session.identity();
            info!("Session {} ({}) offline", session.id(), identity);
            if let Err(e) = self.bus.announce(Tag::System, &identity, OFFLINE).await {
                warn!("Offline notice for {} not sent: {}", identity, e);
            }
        }

        // Out of the registry now, so nothing can be fanned out after this
        if let Some(notice) = notice {
            let _ = session.send(Tag::System, notice);
        }

        session.close_mailbox();
        session.cancel();
        true
    }
}
