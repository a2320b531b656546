//! Server configuration
//!
//! Defaults can be overridden by a JSON file; any field the file leaves out
//! keeps its default.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ChatError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8888";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening address
    pub bind_addr: String,
    /// Seconds without input before a session is evicted
    pub idle_timeout_secs: u64,
    /// Seconds a single line write may take before the connection is dropped
    pub write_timeout_secs: u64,
    /// Longest accepted inbound line, in bytes
    pub max_line_length: usize,
    /// Broadcast queue capacity
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            idle_timeout_secs: 300,
            write_timeout_secs: 10,
            max_line_length: 4096,
            bus_capacity: 256,
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
