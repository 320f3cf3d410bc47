// src/lifecycle.rs
//! Start/stop handles for background loops.
//!
//! Each loop receives a `watch::Receiver<bool>` and is expected to
//! `select!` on `changed()` next to its real work, finish the step it is in,
//! and return.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `body` on the runtime with a fresh shutdown signal.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(body(shutdown_rx));
        Self {
            name,
            shutdown_tx,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the loop to stop without waiting for it.
    pub fn signal(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal and wait until the loop has returned.
    pub async fn stop(self) {
        self.signal();
        match self.task.await {
            Ok(()) => debug!(task = self.name, "task stopped"),
            Err(err) => warn!(task = self.name, error = %err, "task ended abnormally"),
        }
    }
}

/// Stop a group of handles: signal all first, then join them in order.
pub async fn stop_all(handles: Vec<TaskHandle>) {
    for h in &handles {
        h.signal();
    }
    for h in handles {
        h.stop().await;
    }
}
