//! Idle monitor
//!
//! One watcher task per session. Every liveness signal pushes the deadline
//! out by the full idle duration; reaching the deadline runs the eviction
//! callback once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Final state of a watched session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// Session ended (or is still running) without hitting the deadline
    Active,
    /// Deadline reached, eviction callback ran
    Evicted,
}

/// Handle to a running idle watcher
#[derive(Debug)]
pub struct IdleMonitor {
    liveness: Arc<Notify>,
    task: JoinHandle<IdleState>,
}

impl IdleMonitor {
    /// Spawn a watcher that calls `on_idle` after `timeout` without a
    /// liveness signal. Cancelling `cancel` stops the watcher quietly.
    pub fn spawn<F, Fut>(timeout: Duration, cancel: CancellationToken, on_idle: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let liveness = Arc::new(Notify::new());
        let task = tokio::spawn(watch(timeout, Arc::clone(&liveness), cancel, on_idle));
        Self { liveness, task }
    }

    /// Liveness signal; restarts the idle window from now
    pub fn touch(&self) {
        self.liveness.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watcher to finish
    pub async fn join(self) -> IdleState {
        self.task.await.unwrap_or(IdleState::Active)
    }
}

async fn watch<F, Fut>(
    timeout: Duration,
    liveness: Arc<Notify>,
    cancel: CancellationToken,
    on_idle: F,
) -> IdleState
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Idle monitor cancelled");
                return IdleState::Active;
            }
            _ = liveness.notified() => {
                deadline.as_mut().reset(Instant::now() + timeout);
            }
            _ = &mut deadline => {
                on_idle().await;
                return IdleState::Evicted;
            }
        }
    }
}
