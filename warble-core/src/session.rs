//! Session state: the authoritative gateway session fields and the
//! finite-state machine governing login, identification and liveness.
//!
//! ```text
//!  Disconnected ──► HelloPending ──► Identifying ──► Active
//!       ▲                │                │             │
//!       │                ▼                ▼             ▼
//!       └────────── Reconnecting ◄────────┴─────────────┘
//!                        │
//!                      Fatal (unrecoverable, terminal)
//! ```
//!
//! A `Session` has exactly two writers — the decode task and the
//! pacemaker task — which exclude each other through the shared-handle
//! mutex. Nothing else touches it.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::error::WarbleError;

// ── EventKind ────────────────────────────────────────────────────

/// The most recently observed dispatch event name. Drives which
/// fields the decoder extracts from a `d` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    #[default]
    None,
    Ready,
    GuildCreate,
    MessageCreate,
}

impl EventKind {
    /// Map a dispatch event name to the kinds we act on. Anything
    /// unrecognized decays to `None`, which still allows the Hello
    /// interval extraction path.
    pub fn from_name(name: &str) -> Self {
        match name {
            "READY" => EventKind::Ready,
            "GUILD_CREATE" => EventKind::GuildCreate,
            "MESSAGE_CREATE" => EventKind::MessageCreate,
            _ => EventKind::None,
        }
    }
}

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of the gateway session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No active connection. Initial state.
    #[default]
    Disconnected,

    /// Transport is up; waiting for the server's Hello.
    HelloPending,

    /// Hello received; identify sent, waiting for READY.
    Identifying,

    /// Fully established; dispatch frames flow.
    Active,

    /// The session died (liveness or transport failure, or the server
    /// asked for it); a fresh handshake is pending.
    Reconnecting,

    /// Unrecoverable. Terminal.
    Fatal,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `HelloPending`.
    ///
    /// Valid from: `Disconnected`, `Reconnecting`.
    pub fn begin_connect(&mut self) -> Result<(), WarbleError> {
        match self {
            Self::Disconnected | Self::Reconnecting => {
                *self = Self::HelloPending;
                Ok(())
            }
            _ => Err(WarbleError::ProtocolViolation(
                "cannot connect: session already live",
            )),
        }
    }

    /// Transition to `Identifying` (Hello received).
    ///
    /// Valid from: `HelloPending`.
    pub fn begin_identify(&mut self) -> Result<(), WarbleError> {
        match self {
            Self::HelloPending => {
                *self = Self::Identifying;
                Ok(())
            }
            _ => Err(WarbleError::ProtocolViolation(
                "cannot identify: not waiting for Hello",
            )),
        }
    }

    /// Transition to `Active` (READY received).
    ///
    /// Valid from: `Identifying`.
    pub fn activate(&mut self) -> Result<(), WarbleError> {
        match self {
            Self::Identifying => {
                *self = Self::Active;
                Ok(())
            }
            _ => Err(WarbleError::ProtocolViolation(
                "cannot activate: identify not in flight",
            )),
        }
    }

    /// Transition to `Reconnecting`.
    ///
    /// Valid from: any live phase.
    pub fn begin_reconnect(&mut self) -> Result<(), WarbleError> {
        match self {
            Self::HelloPending | Self::Identifying | Self::Active => {
                *self = Self::Reconnecting;
                Ok(())
            }
            _ => Err(WarbleError::ProtocolViolation(
                "cannot reconnect: no session to abandon",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn reset(&mut self) {
        *self = Self::Disconnected;
    }

    /// Mark the session unrecoverable. Terminal.
    pub fn fail(&mut self) {
        *self = Self::Fatal;
    }
}

// ── Session ──────────────────────────────────────────────────────

/// The authoritative session fields. Singleton per process, lives
/// until restart; wiped (except configuration, which lives elsewhere)
/// on every full reconnect.
#[derive(Debug, Default)]
pub struct Session {
    /// Set only on the READY event; cleared on full reconnect.
    session_id: Option<String>,

    /// Last sequence observed in a Dispatch frame with a non-null `s`.
    /// Never moves backward within a session.
    sequence: Option<i64>,

    /// Heartbeat cadence dictated by the server's Hello.
    heartbeat_interval_ms: u32,

    /// True between sending a heartbeat and seeing its ACK (or a
    /// server-initiated Heartbeat request).
    awaiting_ack: bool,

    /// Last opcode seen. Diagnostic only.
    last_opcode: Option<u8>,

    /// Routes `d` field extraction in the decoder.
    pub current_event: EventKind,

    /// Name of the most recently announced guild. Diagnostic only.
    active_guild: Option<String>,

    phase: SessionPhase,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn phase_mut(&mut self) -> &mut SessionPhase {
        &mut self.phase
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence(&self) -> Option<i64> {
        self.sequence
    }

    pub fn heartbeat_interval_ms(&self) -> u32 {
        self.heartbeat_interval_ms
    }

    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    pub fn last_opcode(&self) -> Option<u8> {
        self.last_opcode
    }

    pub fn active_guild(&self) -> Option<&str> {
        self.active_guild.as_deref()
    }

    // ── Mutations (decode task) ──────────────────────────────────

    /// Record a dispatch sequence number.
    ///
    /// A regression is a protocol anomaly: logged, state unchanged.
    /// Returns `true` if the sequence was stored.
    pub fn record_sequence(&mut self, seq: i64) -> bool {
        if let Some(prev) = self.sequence {
            if seq < prev {
                warn!(prev, got = seq, "sequence regression, keeping previous");
                return false;
            }
        }
        self.sequence = Some(seq);
        true
    }

    /// Record the last opcode seen, for diagnostics.
    pub fn record_opcode(&mut self, raw: u8) {
        self.last_opcode = Some(raw);
    }

    /// Capture the session id from READY and activate the session.
    pub fn set_ready(&mut self, session_id: String) -> Result<(), WarbleError> {
        info!(%session_id, "session ready");
        self.session_id = Some(session_id);
        self.phase.activate()
    }

    /// Capture the guild name from GUILD_CREATE. Diagnostic only.
    pub fn set_active_guild(&mut self, name: String) {
        info!(guild = %name, "guild announced");
        self.active_guild = Some(name);
    }

    /// Store the heartbeat cadence from Hello. The interval never
    /// decreases without a reconnect; a pending ACK is forgiven since
    /// the handshake just restarted.
    pub fn set_hello(&mut self, interval_ms: u32) {
        info!(interval_ms, "heartbeat interval set");
        self.heartbeat_interval_ms = interval_ms;
        self.awaiting_ack = false;
    }

    // ── Mutations (pacemaker task) ───────────────────────────────

    /// Arm the next heartbeat: returns `Some(sequence)` to put in the
    /// payload and sets `awaiting_ack`, or `None` if the previous
    /// beat was never acknowledged — the connection is presumed dead
    /// and must not be heartbeated again.
    pub fn arm_heartbeat(&mut self) -> Option<Option<i64>> {
        if self.awaiting_ack {
            return None;
        }
        self.awaiting_ack = true;
        Some(self.sequence)
    }

    /// A heartbeat ACK (or a server-initiated Heartbeat request)
    /// confirmed liveness.
    pub fn ack(&mut self) {
        self.awaiting_ack = false;
    }

    /// Full reconnect wipe: everything except configuration.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.sequence = None;
        self.heartbeat_interval_ms = 0;
        self.awaiting_ack = false;
        self.last_opcode = None;
        self.current_event = EventKind::None;
        self.active_guild = None;
        self.phase.reset();
    }
}

/// Shared handle: the decode task and the pacemaker task must be
/// mutually exclusive when touching `awaiting_ack` / `sequence`.
pub type SharedSession = Arc<Mutex<Session>>;

/// Create a fresh shared session.
pub fn shared_session() -> SharedSession {
    Arc::new(Mutex::new(Session::new()))
}

/// Lock the shared session. A poisoned lock still holds coherent
/// protocol state (both writers leave it consistent between fields),
/// so a panicked peer task does not take the session down with it.
pub fn lock_session(session: &SharedSession) -> std::sync::MutexGuard<'_, Session> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ── SessionFault ─────────────────────────────────────────────────

/// Why a session ended. Every variant tears the current session down
/// and leads to a fresh handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFault {
    /// A heartbeat went a full cycle without acknowledgement.
    LivenessFailure,
    /// The transport dropped, errored or timed out.
    TransportFailure,
    /// The server asked for it (Reconnect or Invalid Session).
    ReconnectRequested,
}

impl std::fmt::Display for SessionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LivenessFailure => write!(f, "missed heartbeat acknowledgement"),
            Self::TransportFailure => write!(f, "transport failure"),
            Self::ReconnectRequested => write!(f, "server requested reconnect"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
