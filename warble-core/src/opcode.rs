//! Gateway opcodes.
//!
//! Uses a proper enum with `TryFrom` — no panics on unknown values.
//! Unknown opcodes are a protocol anomaly for the caller to log, not
//! an excuse to tear the session down.

use crate::error::WarbleError;
use std::fmt;

// ── Opcode ───────────────────────────────────────────────────────

/// Purpose tag carried by every gateway frame.
///
/// Opcodes 2, 3, 4, 6 and 8 are only ever *sent* by a client; receiving
/// one from the server is a protocol violation (logged, no state change).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// An application event (`t`/`s`/`d` are meaningful).
    Dispatch = 0,
    /// Heartbeat — sent on the pacemaker cadence; the server may also
    /// send one to demand an immediate out-of-cycle beat.
    Heartbeat = 1,
    /// Login / identify payload (client → server).
    Identify = 2,
    /// Presence update (client → server).
    PresenceUpdate = 3,
    /// Voice state update (client → server).
    VoiceStateUpdate = 4,
    /// Session resume (client → server, unused — we always re-identify).
    Resume = 6,
    /// Server wants a clean reconnect.
    Reconnect = 7,
    /// Request guild members (client → server).
    RequestGuildMembers = 8,
    /// The session was rejected; reconnect with a fresh handshake.
    InvalidSession = 9,
    /// Handshake start; carries `heartbeat_interval`.
    Hello = 10,
    /// Acknowledges a heartbeat we sent.
    HeartbeatAck = 11,
}

impl TryFrom<u8> for Opcode {
    type Error = WarbleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Dispatch),
            1 => Ok(Opcode::Heartbeat),
            2 => Ok(Opcode::Identify),
            3 => Ok(Opcode::PresenceUpdate),
            4 => Ok(Opcode::VoiceStateUpdate),
            6 => Ok(Opcode::Resume),
            7 => Ok(Opcode::Reconnect),
            8 => Ok(Opcode::RequestGuildMembers),
            9 => Ok(Opcode::InvalidSession),
            10 => Ok(Opcode::Hello),
            11 => Ok(Opcode::HeartbeatAck),
            _ => Err(WarbleError::UnknownVariant {
                type_name: "Opcode",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Opcode {
    /// Returns `true` for opcodes only a client may send. Seeing one
    /// arrive from the server means the peer is misbehaving.
    pub fn is_client_only(&self) -> bool {
        matches!(
            self,
            Opcode::Identify
                | Opcode::PresenceUpdate
                | Opcode::VoiceStateUpdate
                | Opcode::Resume
                | Opcode::RequestGuildMembers
        )
    }

    /// Returns `true` for the opcodes that end the current session and
    /// require a fresh handshake.
    pub fn ends_session(&self) -> bool {
        matches!(self, Opcode::Reconnect | Opcode::InvalidSession)
    }
}
