//! Broadcast bus
//!
//! A single ordered queue of formatted lines with one consumer task that
//! fans each line out to every registered session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::ChatError;
use crate::message::Outbound;
use crate::registry::Registry;
use crate::types::Tag;

/// Producer handle for the broadcast bus
///
/// Cheap to clone. The fan-out task stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: mpsc::Sender<String>,
}

impl BroadcastBus {
    /// Start the fan-out task over `registry`
    pub fn start(registry: Arc<Registry>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let task = tokio::spawn(fan_out(receiver, registry));
        (Self { sender }, task)
    }

    /// Enqueue a fully formatted line
    pub async fn publish(&self, line: String) -> Result<(), ChatError> {
        self.sender
            .send(line)
            .await
            .map_err(|_| ChatError::BusClosed)
    }

    /// Enqueue `[tag]sender:body`
    pub async fn announce(&self, tag: Tag, sender: &str, body: &str) -> Result<(), ChatError> {
        self.publish(Outbound::from_sender(tag, sender, body).to_string())
            .await
    }
}

/// Deliver each queued line, in order, to every session online at that moment
async fn fan_out(mut receiver: mpsc::Receiver<String>, registry: Arc<Registry>) {
    info!("Broadcast fan-out started");

    while let Some(line) = receiver.recv().await {
        let mut undelivered = 0;
        let online = registry
            .for_each(|identity, session| {
                if session.push(line.clone()).is_err() {
                    trace!("Mailbox of {} already closed", identity);
                    undelivered += 1;
                }
            })
            .await;
        debug!("Broadcast to {} sessions ({} closed)", online, undelivered);
    }

    info!("Broadcast fan-out shutting down");
}
