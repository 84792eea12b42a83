//! Bounded queues and the command worker pool.
//!
//! Every pipeline stage is decoupled by a bounded FIFO with one fixed
//! policy: enqueue never blocks (full queue → drop the newest item and
//! log), dequeue waits indefinitely. The producer side is typically a
//! transport callback context that must not stall.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{CommandMessage, CommandTable};
use crate::rest::RestHandle;

// ── Bounded queue ────────────────────────────────────────────────

/// Create a bounded queue stage. `label` names the stage in logs.
pub fn bounded<T>(capacity: usize, label: &'static str) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueSender { tx, label }, QueueReceiver { rx })
}

/// Producer half. Cloneable; `push` is non-blocking.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    label: &'static str,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            label: self.label,
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue without blocking. A full queue drops `item` (the
    /// newest) and returns `false`; a closed queue likewise.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(queue = self.label, "queue full, dropping newest item");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(queue = self.label, "queue closed, item dropped");
                false
            }
        }
    }
}

/// Consumer half. `pop` waits until an item arrives or every sender
/// is gone.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    pub async fn pop(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

// ── Command worker pool ──────────────────────────────────────────

/// A fixed pool of workers draining the command queue.
///
/// At most `workers` command executions run concurrently; an inbound
/// burst beyond that waits in the bounded queue (and past the queue,
/// is dropped by the producer policy above).
pub struct CommandDispatcher {
    workers: Vec<JoinHandle<()>>,
}

impl CommandDispatcher {
    pub fn spawn(
        table: Arc<CommandTable>,
        rest: RestHandle,
        rx: QueueReceiver<CommandMessage>,
        workers: usize,
    ) -> Self {
        let shared = Arc::new(Mutex::new(rx));
        let workers = (0..workers.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                let table = Arc::clone(&table);
                let rest = rest.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting;
                        // release it before running the handler so the
                        // rest of the pool keeps draining.
                        let msg = { shared.lock().await.pop().await };
                        let Some(msg) = msg else { break };
                        debug!(worker = id, content = %msg.content, "running command");
                        table.dispatch(msg, rest.clone()).await;
                    }
                })
            })
            .collect();
        Self { workers }
    }

    /// Abort every worker. Used on session teardown; queued messages
    /// are discarded with their owned strings.
    pub fn abort(&self) {
        for w in &self.workers {
            w.abort();
        }
    }

    /// Wait for the pool to drain and exit (senders must be dropped
    /// first or this never returns).
    pub async fn join(self) {
        for w in self.workers {
            let _ = w.await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
