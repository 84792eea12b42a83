//! Incremental frame decoder.
//!
//! Walks the token list of one inbound frame and extracts only the
//! envelope fields (`op`, `s`, `t`, `d`) plus the event-specific
//! sub-fields the current event context calls for. No object graph is
//! ever built; every extracted field is copied out of the frame into
//! an owned string before the buffer is reused.
//!
//! A malformed frame is discarded with an error — the session is
//! never torn down over a single bad frame.

use tracing::{debug, info, warn};

use crate::command::{CommandMessage, MatchOutcome, MessageBuilder};
use crate::error::WarbleError;
use crate::opcode::Opcode;
use crate::session::{EventKind, Session};
use crate::token::{Token, TokenKind, extent};

// ── GatewayAction ────────────────────────────────────────────────

/// What the engine must do as a consequence of one decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub enum GatewayAction {
    /// The server demanded an immediate out-of-cycle heartbeat.
    SendHeartbeat,
    /// Hello arrived: start the pacemaker at this cadence and send
    /// the identify payload.
    StartHandshake { heartbeat_interval_ms: u32 },
    /// The server ended the session (Reconnect or Invalid Session);
    /// tear down and re-handshake.
    Reconnect,
    /// A qualifying user command.
    Command(CommandMessage),
    /// The bypass keyword matched; answer with basic help.
    Help(CommandMessage),
}

// ── FrameDecoder ─────────────────────────────────────────────────

/// Stateless walker over one frame's token list. The mutable frame
/// context (current event, sequence, ack flag) lives in [`Session`].
pub struct FrameDecoder {
    prefix: String,
    case_sensitive: bool,
    help_keyword: Option<String>,
}

impl FrameDecoder {
    pub fn new(prefix: &str, case_sensitive: bool, help_keyword: Option<&str>) -> Self {
        Self {
            prefix: prefix.to_string(),
            case_sensitive,
            help_keyword: help_keyword.map(str::to_string),
        }
    }

    /// Decode one fully-buffered frame.
    ///
    /// Advances `session` as a side effect and returns the actions
    /// the engine must take. `Err` means the whole frame is discarded
    /// (non-fatal).
    pub fn decode(
        &self,
        frame: &[u8],
        tokens: &[Token],
        session: &mut Session,
    ) -> Result<Vec<GatewayAction>, WarbleError> {
        let Some(root) = tokens.first() else {
            return Err(WarbleError::Decode("empty frame"));
        };
        if root.kind != TokenKind::Object {
            return Err(WarbleError::Decode("top-level JSON value is not an object"));
        }

        let mut actions = Vec::new();
        let mut builder: Option<MessageBuilder> = None;

        let mut idx = 1;
        let mut remaining = root.child_count;
        while remaining >= 2 {
            let val_idx = idx + 1;
            let key = tokens[idx].text(frame)?;
            let val = &tokens[val_idx];
            match key {
                // Event name. A null `t` (control frames) clears the
                // event context.
                "t" => {
                    if val.kind == TokenKind::String {
                        let name = val.text(frame)?;
                        debug!(event = name, "dispatch event");
                        session.current_event = EventKind::from_name(name);
                    } else {
                        session.current_event = EventKind::None;
                    }
                }
                "s" => {
                    if val.kind == TokenKind::Primitive && !val.is_null(frame) {
                        match val.text(frame)?.parse::<i64>() {
                            Ok(seq) => {
                                session.record_sequence(seq);
                            }
                            Err(_) => warn!("unparseable sequence field, ignored"),
                        }
                    }
                }
                "op" => {
                    if val.kind == TokenKind::Primitive && !val.is_null(frame) {
                        match val.text(frame)?.parse::<u8>() {
                            Ok(raw) => self.route_opcode(raw, session, &mut actions),
                            Err(_) => warn!("unparseable opcode field, ignored"),
                        }
                    }
                }
                "d" => {
                    if val.kind == TokenKind::Object {
                        self.scan_data(frame, tokens, val_idx, session, &mut actions, &mut builder)?;
                    }
                }
                _ => {}
            }
            idx = val_idx + extent(tokens, val_idx);
            remaining -= 2;
        }

        if session.current_event == EventKind::MessageCreate {
            if let Some(b) = builder.take() {
                match b.finish(
                    &self.prefix,
                    self.case_sensitive,
                    self.help_keyword.as_deref(),
                ) {
                    MatchOutcome::Command(msg) => actions.push(GatewayAction::Command(msg)),
                    MatchOutcome::Help(msg) => actions.push(GatewayAction::Help(msg)),
                    MatchOutcome::Void => {}
                }
            }
        }

        Ok(actions)
    }

    /// Drive the session state machine from one opcode and collect
    /// the resulting actions. Anomalies are logged, never fatal.
    fn route_opcode(&self, raw: u8, session: &mut Session, actions: &mut Vec<GatewayAction>) {
        session.record_opcode(raw);
        match Opcode::try_from(raw) {
            Ok(Opcode::Dispatch) => debug!("opcode: Dispatch"),
            Ok(Opcode::Heartbeat) => {
                debug!("opcode: Heartbeat (server-requested)");
                // A heartbeat request from the server counts as proof
                // of liveness, same as an ACK.
                session.ack();
                actions.push(GatewayAction::SendHeartbeat);
            }
            Ok(Opcode::Reconnect) => {
                info!("opcode: Reconnect");
                actions.push(GatewayAction::Reconnect);
            }
            Ok(Opcode::InvalidSession) => {
                warn!("opcode: Invalid Session");
                actions.push(GatewayAction::Reconnect);
            }
            Ok(Opcode::Hello) => {
                // The interval itself arrives in `d`.
                debug!("opcode: Hello");
            }
            Ok(Opcode::HeartbeatAck) => {
                debug!("opcode: Heartbeat ACK");
                session.ack();
            }
            Ok(other) => {
                // 2, 3, 4, 6, 8 — we should only ever be sending these.
                warn!(opcode = %other, "client-only opcode received from server");
            }
            Err(_) => warn!(opcode = raw, "unknown opcode, ignored"),
        }
    }

    /// One-level scan of the `d` object, routed by the current event.
    fn scan_data(
        &self,
        frame: &[u8],
        tokens: &[Token],
        obj_idx: usize,
        session: &mut Session,
        actions: &mut Vec<GatewayAction>,
        builder: &mut Option<MessageBuilder>,
    ) -> Result<(), WarbleError> {
        let mut idx = obj_idx + 1;
        let mut remaining = tokens[obj_idx].child_count;
        while remaining >= 2 {
            let val_idx = idx + 1;
            let key = tokens[idx].text(frame)?;
            let val = &tokens[val_idx];

            match session.current_event {
                EventKind::Ready => {
                    if key == "session_id" && val.kind == TokenKind::String {
                        if let Err(e) = session.set_ready(val.text(frame)?.to_string()) {
                            warn!(error = %e, "READY outside identify, state kept");
                        }
                    }
                }
                EventKind::GuildCreate => {
                    if key == "name" && val.kind == TokenKind::String {
                        session.set_active_guild(val.text(frame)?.to_string());
                    }
                }
                EventKind::MessageCreate => {
                    let b = builder.get_or_insert_with(MessageBuilder::new);
                    match key {
                        "channel_id" if val.kind == TokenKind::String => {
                            b.channel_id(val.text(frame)?.to_string());
                        }
                        "guild_id" if val.kind == TokenKind::String => {
                            b.guild_id(val.text(frame)?.to_string());
                        }
                        "content" if val.kind == TokenKind::String => {
                            b.content(val.text(frame)?.to_string());
                        }
                        "webhook_id" => b.webhook(),
                        "type" if val.kind == TokenKind::Primitive => {
                            b.message_type(val.text(frame)?.to_string());
                        }
                        "author" if val.kind == TokenKind::Object => {
                            Self::scan_author(frame, tokens, val_idx, b)?;
                        }
                        _ => {}
                    }
                }
                EventKind::None => {
                    if key == "heartbeat_interval"
                        && val.kind == TokenKind::Primitive
                        && !val.is_null(frame)
                    {
                        match val.text(frame)?.parse::<u32>() {
                            Ok(ms) => {
                                session.set_hello(ms);
                                actions.push(GatewayAction::StartHandshake {
                                    heartbeat_interval_ms: ms,
                                });
                            }
                            Err(_) => warn!("unparseable heartbeat_interval, ignored"),
                        }
                    }
                }
            }

            idx = val_idx + extent(tokens, val_idx);
            remaining -= 2;
        }
        Ok(())
    }

    /// Second-level scan of the message author object.
    fn scan_author(
        frame: &[u8],
        tokens: &[Token],
        obj_idx: usize,
        builder: &mut MessageBuilder,
    ) -> Result<(), WarbleError> {
        let mut idx = obj_idx + 1;
        let mut remaining = tokens[obj_idx].child_count;
        while remaining >= 2 {
            let val_idx = idx + 1;
            let key = tokens[idx].text(frame)?;
            let val = &tokens[val_idx];
            if val.kind == TokenKind::String {
                match key {
                    "username" => builder.author_name(val.text(frame)?.to_string()),
                    "id" => builder.author_id(val.text(frame)?.to_string()),
                    _ => {}
                }
            }
            idx = val_idx + extent(tokens, val_idx);
            remaining -= 2;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
