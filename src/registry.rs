//! Online session registry
//!
//! Maps display identities to sessions. Every operation takes the lock
//! itself; callers never see the guard.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ChatError;
use crate::session::Session;

/// Identity → Session directory
///
/// Writes (register, unregister, rename) take the lock exclusively.
/// Iteration holds the shared lock for its whole duration, so a session is
/// never delivered to while it is being removed.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its current identity
    pub async fn register(&self, session: Arc<Session>) -> Result<(), ChatError> {
        let identity = session.identity();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&identity) {
            return Err(ChatError::NameConflict(identity));
        }
        sessions.insert(identity, session);
        debug!("Online sessions: {}", sessions.len());
        Ok(())
    }

    /// Remove whatever session is registered under `identity`
    ///
    /// Removing an absent identity is a no-op.
    pub async fn unregister(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(identity)
    }

    /// Remove `session`, but only if it still owns its identity slot
    ///
    /// Returns false if it was not registered (already removed, or the name
    /// now belongs to someone else).
    pub async fn remove_session(&self, session: &Session) -> bool {
        let mut sessions = self.sessions.write().await;
        let identity = session.identity();
        let owns_slot = sessions
            .get(&identity)
            .is_some_and(|s| s.id() == session.id());
        if owns_slot {
            sessions.remove(&identity);
            debug!("Online sessions: {}", sessions.len());
        }
        owns_slot
    }

    /// Move `session` from its current identity to `new`
    ///
    /// Check and move happen under one write lock, so two sessions racing for
    /// the same name cannot both win. A session that no longer owns its slot
    /// gets `NotFound`. On any error nothing changes.
    pub async fn rename(&self, session: &Session, new: &str) -> Result<(), ChatError> {
        let mut sessions = self.sessions.write().await;
        let old = session.identity();
        let owns_slot = sessions
            .get(&old)
            .is_some_and(|s| s.id() == session.id());
        if !owns_slot {
            return Err(ChatError::NotFound(old));
        }
        if sessions.contains_key(new) {
            return Err(ChatError::NameConflict(new.to_string()));
        }
        if let Some(entry) = sessions.remove(&old) {
            entry.set_identity(new.to_string());
            sessions.insert(new.to_string(), entry);
        }
        Ok(())
    }

    pub async fn lookup(&self, identity: &str) -> Result<Arc<Session>, ChatError> {
        self.sessions
            .read()
            .await
            .get(identity)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(identity.to_string()))
    }

    /// Every registered session at this instant
    pub async fn snapshot_for_broadcast(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Visit every registered session while holding the shared lock
    ///
    /// `f` must not call back into the registry.
    pub async fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&str, &Session),
    {
        let sessions = self.sessions.read().await;
        for (identity, session) in sessions.iter() {
            f(identity, session);
        }
        sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
