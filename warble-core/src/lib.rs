//! # warble-core
//!
//! Gateway session protocol engine for the Warble chat bot.
//!
//! This crate contains:
//! - **Session**: `Session`, `SessionPhase` — the authoritative session
//!   fields and the login/identify/liveness state machine
//! - **Decoding**: `JsonTokenizer` flat tokenization and `FrameDecoder`
//!   field extraction, no object graph ever built
//! - **Pacemaker**: heartbeat emission and missed-ACK detection
//! - **Pipeline**: bounded drop-on-full queues, the command worker
//!   pool, and the `RestSender` queue contract
//! - **Outbound**: `PayloadSender` — the single serialized, paced
//!   format-and-send path
//! - **Collaborators**: `Transport` and `HttpClient` traits injected
//!   at construction
//! - **Error**: `WarbleError` — typed, `thiserror`-based error
//!   hierarchy

pub mod client;
pub mod command;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod opcode;
pub mod outbound;
pub mod pacemaker;
pub mod payload;
pub mod rest;
pub mod session;
pub mod token;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{GatewayClient, GatewayConfig};
pub use command::{CommandMessage, CommandTable, MatchOutcome, MessageBuilder};
pub use decoder::{FrameDecoder, GatewayAction};
pub use dispatch::{CommandDispatcher, QueueReceiver, QueueSender, bounded};
pub use error::WarbleError;
pub use opcode::Opcode;
pub use outbound::PayloadSender;
pub use pacemaker::{Pacemaker, PacemakerHandle};
pub use payload::GatewayIntents;
pub use rest::{HttpClient, RestHandle, RestPostJob, RestSender};
pub use session::{
    EventKind, Session, SessionFault, SessionPhase, SharedSession, lock_session, shared_session,
};
pub use token::{JsonTokenizer, Token, TokenError, TokenKind, extent};
pub use transport::{FrameAssembler, Transport, TransportEvent};
