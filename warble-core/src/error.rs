//! Domain-specific error types for the gateway engine.
//!
//! All fallible operations return `Result<T, WarbleError>`.
//! No panics on invalid input — every error is typed and recoverable,
//! with the single exception of allocation failure, which aborts.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the gateway engine.
#[derive(Debug, Error)]
pub enum WarbleError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A frame or transition violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Decode Errors ────────────────────────────────────────────
    /// An inbound frame could not be decoded. The frame is discarded;
    /// the session survives.
    #[error("decode error: {0}")]
    Decode(&'static str),

    /// The frame produced more tokens than the configured table holds.
    #[error("token table overflow: frame needs more than {max} tokens")]
    TokenOverflow { max: usize },

    /// The frame ended mid-value.
    #[error("partial JSON input")]
    PartialInput,

    /// A field held bytes that were not valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    // ── Connection Errors ────────────────────────────────────────
    /// The transport layer reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The underlying I/O layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline. Treated as a connection
    /// failure, never a protocol error.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// A bounded queue was full; the newest item was dropped.
    #[error("queue {0} full, item dropped")]
    QueueFull(&'static str),

    // ── REST Errors ──────────────────────────────────────────────
    /// The HTTP client reported a failure before a status was read.
    #[error("http error: {0}")]
    Http(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for WarbleError {
    fn from(s: String) -> Self {
        WarbleError::Other(s)
    }
}

impl From<&str> for WarbleError {
    fn from(s: &str) -> Self {
        WarbleError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for WarbleError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        WarbleError::ChannelClosed
    }
}
