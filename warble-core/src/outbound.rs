//! Serialized outbound send path.
//!
//! Several independent tasks — the pacemaker, the identify step,
//! command replies — format payloads for the gateway. They all go
//! through one [`PayloadSender`]: a mutex-guarded transmit buffer
//! whose lock covers exactly "format into buffer, hand to the
//! transport writer", plus a minimum inter-send spacing enforced on
//! the sending task before the lock is taken.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, sleep, timeout};
use tracing::trace;

use crate::error::WarbleError;

// ── PayloadSender ────────────────────────────────────────────────

/// Cloneable handle to the outbound format-and-send path.
#[derive(Clone)]
pub struct PayloadSender {
    inner: Arc<Inner>,
}

struct Inner {
    /// The transmit scratch buffer. Acquired for the shortest
    /// possible scope and released before any pacing delay.
    buf: Mutex<BytesMut>,
    /// Handoff to the connection writer.
    tx: mpsc::Sender<Bytes>,
    /// Serializes senders and carries the last-send stamp for pacing.
    pacing: Mutex<Option<Instant>>,
    min_spacing: Duration,
    lock_timeout: Duration,
}

impl PayloadSender {
    pub fn new(tx: mpsc::Sender<Bytes>, min_spacing: Duration, lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                buf: Mutex::new(BytesMut::with_capacity(512)),
                tx,
                pacing: Mutex::new(None),
                min_spacing,
                lock_timeout,
            }),
        }
    }

    /// Format `json` into the shared transmit buffer and hand it to
    /// the transport writer.
    ///
    /// Failing to win the buffer within the lock timeout is a send
    /// failure, not a fatal error. The pacing delay runs on the
    /// calling task; the decode/receive path never waits here.
    pub async fn send_payload(&self, json: &str) -> Result<(), WarbleError> {
        let mut last_send = self.inner.pacing.lock().await;
        if let Some(prev) = *last_send {
            let since = prev.elapsed();
            if since < self.inner.min_spacing {
                sleep(self.inner.min_spacing - since).await;
            }
        }

        {
            let mut buf = timeout(self.inner.lock_timeout, self.inner.buf.lock())
                .await
                .map_err(|_| WarbleError::Timeout(self.inner.lock_timeout))?;
            buf.clear();
            buf.extend_from_slice(json.as_bytes());
            let frame = buf.split().freeze();
            trace!(len = frame.len(), "payload handed to transport");
            self.inner
                .tx
                .send(frame)
                .await
                .map_err(|_| WarbleError::ChannelClosed)?;
        }

        *last_send = Some(Instant::now());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(
        spacing_ms: u64,
    ) -> (PayloadSender, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        let sender = PayloadSender::new(
            tx,
            Duration::from_millis(spacing_ms),
            Duration::from_secs(1),
        );
        (sender, rx)
    }

    #[tokio::test]
    async fn payload_reaches_the_writer() {
        let (sender, mut rx) = sender(0);
        sender.send_payload(r#"{"op":1,"d":null}"#).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(&frame[..], br#"{"op":1,"d":null}"#);
    }

    #[tokio::test]
    async fn closed_writer_is_a_send_failure() {
        let (sender, rx) = sender(0);
        drop(rx);
        let err = sender.send_payload("{}").await.unwrap_err();
        assert!(matches!(err, WarbleError::ChannelClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_is_enforced_between_sends() {
        let (sender, mut rx) = sender(550);
        let started = Instant::now();
        sender.send_payload("a").await.unwrap();
        sender.send_payload("b").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(550));
        assert_eq!(&rx.recv().await.unwrap()[..], b"a");
        assert_eq!(&rx.recv().await.unwrap()[..], b"b");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_senders_are_serialized_and_paced() {
        let (sender, mut rx) = sender(100);
        let a = sender.clone();
        let b = sender.clone();
        let started = Instant::now();
        let (ra, rb) = tokio::join!(
            a.send_payload("first"),
            b.send_payload("second"),
        );
        ra.unwrap();
        rb.unwrap();
        // The second send could not start its window before the first
        // finished.
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }
}
