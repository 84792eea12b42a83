//! Transport collaborator contract and inbound frame reassembly.
//!
//! The engine never touches sockets. It is handed something that can
//! connect, send whole payloads, and deliver [`TransportEvent`]s; the
//! WebSocket (or test double) mechanics live with the implementor.
//! Large frames may arrive as several `Data` events — reassembling
//! them into one buffer before decoding is the engine's job.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::error::WarbleError;

// ── TransportEvent ───────────────────────────────────────────────

/// Events delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// One chunk of an inbound frame. `total_len` is the size of the
    /// complete frame; `offset` is where this chunk starts in it.
    Data {
        payload: Bytes,
        total_len: usize,
        offset: usize,
    },
    Error(String),
}

// ── Transport ────────────────────────────────────────────────────

/// The connection collaborator injected into the engine.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Establish the connection. The engine wraps this in its own
    /// timeout; a slow connect is a connection failure.
    async fn connect(&mut self, uri: &str) -> Result<(), WarbleError>;

    /// Send one complete outbound frame.
    async fn send(&mut self, payload: &[u8]) -> Result<usize, WarbleError>;

    /// Next event, or `None` once the transport is finished for good.
    ///
    /// Polled inside `select!`; implementations must be cancel-safe
    /// (dropping the future must not lose an event).
    async fn next_event(&mut self) -> Option<TransportEvent>;

    fn is_connected(&self) -> bool;

    /// Tear the connection down. Must be safe to call when already
    /// closed.
    async fn close(&mut self);
}

// ── FrameAssembler ───────────────────────────────────────────────

/// Accumulates `Data` chunks into one frame buffer.
///
/// Chunks are expected in order; a gap or an oversized frame discards
/// everything up to the next frame start (`offset == 0`). The buffer
/// is reused across frames, so completed frames are handed out as
/// owned [`Bytes`].
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    capacity: usize,
    total: usize,
    filled: usize,
    discarding: bool,
}

impl FrameAssembler {
    /// `capacity` is the receive-buffer budget; frames announcing a
    /// larger `total_len` are dropped whole.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            total: 0,
            filled: 0,
            discarding: false,
        }
    }

    /// Feed one chunk. Returns the completed frame once
    /// `offset + len == total_len`.
    pub fn push(&mut self, payload: &[u8], total_len: usize, offset: usize) -> Option<Bytes> {
        if offset == 0 {
            // New frame; whatever was in flight is abandoned.
            if self.filled > 0 {
                warn!(
                    expected = self.total,
                    got = self.filled,
                    "incomplete frame abandoned"
                );
            }
            self.buf.clear();
            self.total = total_len;
            self.filled = 0;
            self.discarding = total_len > self.capacity;
            if self.discarding {
                warn!(
                    total_len,
                    capacity = self.capacity,
                    "frame exceeds receive buffer, dropped"
                );
            }
        }

        if self.discarding {
            return None;
        }
        if offset != self.filled || total_len != self.total {
            warn!(
                offset,
                expected = self.filled,
                "chunk out of order, frame dropped"
            );
            self.discarding = true;
            return None;
        }
        if self.filled + payload.len() > self.total {
            warn!("chunk overruns announced frame length, frame dropped");
            self.discarding = true;
            return None;
        }

        self.buf.extend_from_slice(payload);
        self.filled += payload.len();

        if self.filled == self.total {
            self.filled = 0;
            self.total = 0;
            Some(self.buf.split().freeze())
        } else {
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_frame() {
        let mut asm = FrameAssembler::new(64);
        let frame = asm.push(b"{\"op\":11}", 9, 0).expect("complete");
        assert_eq!(&frame[..], b"{\"op\":11}");
    }

    #[test]
    fn multi_chunk_frame() {
        let mut asm = FrameAssembler::new(64);
        assert!(asm.push(b"{\"op\"", 9, 0).is_none());
        let frame = asm.push(b":11}", 9, 5).expect("complete");
        assert_eq!(&frame[..], b"{\"op\":11}");
    }

    #[test]
    fn oversized_frame_dropped_then_recovers() {
        let mut asm = FrameAssembler::new(8);
        assert!(asm.push(b"0123456789", 20, 0).is_none());
        assert!(asm.push(b"0123456789", 20, 10).is_none());
        // Next frame starts clean.
        let frame = asm.push(b"ok", 2, 0).expect("complete");
        assert_eq!(&frame[..], b"ok");
    }

    #[test]
    fn gap_discards_frame() {
        let mut asm = FrameAssembler::new(64);
        assert!(asm.push(b"abc", 10, 0).is_none());
        // Offset 7 but only 3 bytes buffered: drop the frame.
        assert!(asm.push(b"def", 10, 7).is_none());
        assert!(asm.push(b"ghij", 10, 10).is_none());
        // Recovery on the next frame start.
        assert!(asm.push(b"fresh", 5, 0).is_some());
    }

    #[test]
    fn abandoned_partial_replaced_by_new_frame() {
        let mut asm = FrameAssembler::new(64);
        assert!(asm.push(b"part", 10, 0).is_none());
        // New frame begins before the old one completed.
        let frame = asm.push(b"done", 4, 0).expect("complete");
        assert_eq!(&frame[..], b"done");
    }

    #[test]
    fn buffer_reuse_leaves_frames_intact() {
        let mut asm = FrameAssembler::new(64);
        let a = asm.push(b"first", 5, 0).unwrap();
        let b = asm.push(b"second", 6, 0).unwrap();
        assert_eq!(&a[..], b"first");
        assert_eq!(&b[..], b"second");
    }
}
