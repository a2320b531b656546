//! Basic type definitions for the chat server
//!
//! Provides small wrappers for type safety:
//! - `SessionId`: UUID-based identifier that survives renames
//! - `Tag`: the fixed set of line tags shown to users

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4. Unlike the display identity it never changes,
/// so it is what tells two sessions apart across a rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, used to disambiguate colliding identities
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Line tag, rendered as `[tag]` at the start of every outbound line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// System notices
    System,
    /// Public hall chat
    Hall,
    /// Private messages
    Private,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::System => "系统",
            Tag::Hall => "大厅",
            Tag::Private => "私聊",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
