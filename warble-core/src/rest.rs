//! Outbound REST sender.
//!
//! Command handlers never talk HTTP directly: they enqueue a
//! [`RestPostJob`] and a single worker drains the queue, paces the
//! calls, and performs them through the injected [`HttpClient`]. The
//! job owns its strings, so every exit path — success, HTTP failure,
//! malformed job — releases them when the job drops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::dispatch::{QueueSender, bounded};
use crate::error::WarbleError;
use crate::payload;

// ── RestPostJob ──────────────────────────────────────────────────

/// One queued REST call. Created per command reply, consumed exactly
/// once by the worker.
#[derive(Debug)]
pub struct RestPostJob {
    pub path: String,
    pub json_body: String,
}

// ── HttpClient ───────────────────────────────────────────────────

/// The HTTP transport collaborator. The core defines only the
/// contract; mechanics (TLS, connection reuse, timeouts) live with
/// the implementor.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// POST `json_body` to `path`, returning the response status.
    async fn post(
        &self,
        path: &str,
        auth_header: &str,
        json_body: &str,
    ) -> Result<u16, WarbleError>;
}

// ── RestHandle ───────────────────────────────────────────────────

/// Cloneable enqueue handle given to command handlers.
#[derive(Clone)]
pub struct RestHandle {
    tx: QueueSender<RestPostJob>,
}

impl RestHandle {
    /// Queue a plain-text message to a channel.
    pub fn post_text(&self, channel_id: &str, content: &str) -> bool {
        self.enqueue(RestPostJob {
            path: payload::channel_messages_path(channel_id),
            json_body: payload::message_json(Some(content), None, None),
        })
    }

    /// Queue a basic embed (title + description) to a channel.
    pub fn post_embed(&self, channel_id: &str, title: &str, description: &str) -> bool {
        self.enqueue(RestPostJob {
            path: payload::channel_messages_path(channel_id),
            json_body: payload::message_json(None, Some(title), Some(description)),
        })
    }

    /// Queue a raw job. Drops it (and its strings) if the queue is
    /// full.
    pub fn enqueue(&self, job: RestPostJob) -> bool {
        self.tx.push(job)
    }

    /// A handle wired to a bare queue with no worker. Test use only.
    #[cfg(test)]
    pub(crate) fn detached(
        capacity: usize,
    ) -> (Self, crate::dispatch::QueueReceiver<RestPostJob>) {
        let (tx, rx) = bounded(capacity, "rest");
        (Self { tx }, rx)
    }
}

// ── RestSender ───────────────────────────────────────────────────

/// The queue plus its single worker task.
pub struct RestSender {
    handle: RestHandle,
    worker: JoinHandle<()>,
}

impl RestSender {
    /// Spawn the worker. `auth_token` is the raw bot token; the
    /// Authorization header is derived once here.
    pub fn spawn(
        http: Arc<dyn HttpClient>,
        auth_token: &str,
        capacity: usize,
        min_spacing: Duration,
    ) -> Self {
        let (tx, mut rx) = bounded::<RestPostJob>(capacity, "rest");
        let auth = payload::auth_header(auth_token);
        let worker = tokio::spawn(async move {
            let mut last_send: Option<Instant> = None;
            while let Some(job) = rx.pop().await {
                if let Some(prev) = last_send {
                    let since = prev.elapsed();
                    if since < min_spacing {
                        sleep(min_spacing - since).await;
                    }
                }
                debug!(path = %job.path, "performing REST POST");
                match http.post(&job.path, &auth, &job.json_body).await {
                    Ok(status) if (200..300).contains(&status) => {
                        info!(status, path = %job.path, "REST POST ok");
                    }
                    Ok(status) => {
                        warn!(status, path = %job.path, "REST POST rejected");
                    }
                    Err(e) => {
                        warn!(error = %e, path = %job.path, "REST POST failed");
                    }
                }
                last_send = Some(Instant::now());
                // `job` drops here on every path, releasing its strings.
            }
        });
        Self {
            handle: RestHandle { tx },
            worker,
        }
    }

    /// The enqueue handle for command handlers.
    pub fn handle(&self) -> RestHandle {
        self.handle.clone()
    }

    /// Stop the worker immediately, discarding queued jobs.
    pub fn abort(&self) {
        self.worker.abort();
    }
}

// ── Tests ────────────────────────────────────────────────────────
