//! The gateway session engine.
//!
//! Wires the pipeline together and owns the reconnect policy:
//!
//! ```text
//! transport event ─► FrameAssembler ─► frame queue ─► decode task
//!                                                        │
//!                  pacemaker ◄── actions ──┬─────────────┘
//!                      │                   ▼
//!                      └──► PayloadSender  command queue ─► workers ─► RestSender
//! ```
//!
//! Any session fault — a missed heartbeat ACK, a transport failure, a
//! server-requested reconnect — tears the whole pipeline down, resets
//! the session, and starts a fresh handshake after a capped
//! exponential backoff. Only configuration survives.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tracing::{info, warn};

use crate::command::{CommandMessage, CommandTable};
use crate::decoder::{FrameDecoder, GatewayAction};
use crate::dispatch::{CommandDispatcher, QueueReceiver, QueueSender, bounded};
use crate::error::WarbleError;
use crate::outbound::PayloadSender;
use crate::pacemaker::{Pacemaker, PacemakerHandle};
use crate::payload::{self, GatewayIntents};
use crate::rest::{HttpClient, RestHandle, RestSender};
use crate::session::{SessionFault, SharedSession, lock_session, shared_session};
use crate::token::{JsonTokenizer, TokenError};
use crate::transport::{FrameAssembler, Transport, TransportEvent};

// ── GatewayConfig ────────────────────────────────────────────────

/// Everything the engine needs to know up front. This is the only
/// state that survives a reconnect.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateway_uri: String,
    pub auth_token: String,
    pub command_prefix: String,
    pub case_sensitive: bool,
    /// Alternate keyword that answers with basic help even when the
    /// prefix does not match.
    pub help_keyword: Option<String>,
    /// Answer unmatched commands with the command list instead of
    /// dropping them.
    pub reply_on_unknown: bool,
    pub intents: GatewayIntents,
    /// Budget for one reassembled inbound frame.
    pub receive_buffer_size: usize,
    /// Token table size for one frame.
    pub max_tokens: usize,
    pub frame_queue_capacity: usize,
    pub command_queue_capacity: usize,
    /// Size of the command worker pool.
    pub max_concurrent_commands: usize,
    pub rest_queue_capacity: usize,
    /// Minimum spacing between any two outbound sends.
    pub min_send_spacing: Duration,
    pub connect_timeout: Duration,
    /// Bounded wait for the transmit buffer; losing it is a send
    /// failure.
    pub send_lock_timeout: Duration,
    pub reconnect_backoff_min: Duration,
    pub reconnect_backoff_max: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_uri: "wss://gateway.discord.gg/?v=10&encoding=json".into(),
            auth_token: String::new(),
            command_prefix: "!".into(),
            case_sensitive: false,
            help_keyword: None,
            reply_on_unknown: false,
            intents: GatewayIntents::default(),
            receive_buffer_size: 8192,
            max_tokens: 256,
            frame_queue_capacity: 16,
            command_queue_capacity: 16,
            max_concurrent_commands: 5,
            rest_queue_capacity: 16,
            min_send_spacing: Duration::from_millis(550),
            connect_timeout: Duration::from_secs(10),
            send_lock_timeout: Duration::from_secs(1),
            reconnect_backoff_min: Duration::from_secs(1),
            reconnect_backoff_max: Duration::from_secs(64),
        }
    }
}

/// A session older than this is considered to have been healthy, so
/// the next reconnect starts from the minimum backoff again.
const STABLE_SESSION: Duration = Duration::from_secs(60);

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

// ── GatewayClient ────────────────────────────────────────────────

/// The embedded gateway client. Construct, register commands, `run`.
pub struct GatewayClient<T: Transport> {
    config: GatewayConfig,
    transport: T,
    http: Arc<dyn HttpClient>,
    table: CommandTable,
    session: SharedSession,
}

impl<T: Transport> GatewayClient<T> {
    pub fn new(config: GatewayConfig, transport: T, http: Arc<dyn HttpClient>) -> Self {
        let table = CommandTable::new(config.case_sensitive, config.reply_on_unknown);
        Self {
            config,
            transport,
            http,
            table,
            session: shared_session(),
        }
    }

    /// The command table, for registration before `run`.
    pub fn commands(&mut self) -> &mut CommandTable {
        &mut self.table
    }

    /// Handle on the session state, for observation.
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// Run until the process dies. Reconnects on every session fault;
    /// returns early only for unrecoverable configuration problems.
    pub async fn run(self) -> Result<(), WarbleError> {
        let Self {
            config,
            mut transport,
            http,
            table,
            session,
        } = self;

        if config.auth_token.is_empty() {
            lock_session(&session).phase_mut().fail();
            return Err(WarbleError::ProtocolViolation("auth token not configured"));
        }

        let table = Arc::new(table);
        let rest = RestSender::spawn(
            http,
            &config.auth_token,
            config.rest_queue_capacity,
            config.min_send_spacing,
        );
        let identify = payload::identify_json(&config.auth_token, config.intents);

        let mut backoff = config.reconnect_backoff_min;
        loop {
            let started = Instant::now();
            let fault = run_session(&config, &mut transport, &session, &table, &rest, &identify)
                .await;
            warn!(reason = %fault, "session ended");
            lock_session(&session).reset();

            if started.elapsed() >= STABLE_SESSION {
                backoff = config.reconnect_backoff_min;
            }
            info!(delay = ?backoff, "reconnecting after backoff");
            sleep(backoff).await;
            backoff = next_backoff(backoff, config.reconnect_backoff_max);
        }
    }
}

// ── Session run ──────────────────────────────────────────────────

/// One connect-to-fault session. Returns why it ended; the caller
/// owns backoff and retry.
async fn run_session<T: Transport>(
    config: &GatewayConfig,
    transport: &mut T,
    session: &SharedSession,
    table: &Arc<CommandTable>,
    rest: &RestSender,
    identify: &str,
) -> SessionFault {
    {
        let mut s = lock_session(session);
        if let Err(e) = s.phase_mut().begin_connect() {
            warn!(error = %e, "session phase out of step, resetting");
            s.reset();
            let _ = s.phase_mut().begin_connect();
        }
    }

    info!(uri = %config.gateway_uri, "connecting to gateway");
    match timeout(config.connect_timeout, transport.connect(&config.gateway_uri)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "connect failed");
            return SessionFault::TransportFailure;
        }
        Err(_) => {
            warn!(limit = ?config.connect_timeout, "connect timed out");
            return SessionFault::TransportFailure;
        }
    }

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(16);
    let sender = PayloadSender::new(out_tx, config.min_send_spacing, config.send_lock_timeout);
    let (frame_tx, frame_rx) = bounded::<Bytes>(config.frame_queue_capacity, "frames");
    let (cmd_tx, cmd_rx) = bounded::<CommandMessage>(config.command_queue_capacity, "commands");
    let (fault_tx, mut fault_rx) = mpsc::channel::<SessionFault>(4);

    let pacemaker = Pacemaker::spawn(Arc::clone(session), sender.clone(), fault_tx.clone());
    let dispatcher = CommandDispatcher::spawn(
        Arc::clone(table),
        rest.handle(),
        cmd_rx,
        config.max_concurrent_commands,
    );
    let stage = DecodeStage {
        session: Arc::clone(session),
        decoder: FrameDecoder::new(
            &config.command_prefix,
            config.case_sensitive,
            config.help_keyword.as_deref(),
        ),
        sender,
        pacemaker: pacemaker.handle(),
        cmd_tx,
        fault_tx,
        table: Arc::clone(table),
        rest: rest.handle(),
        identify: identify.to_string(),
        max_tokens: config.max_tokens,
    };
    let decode_task = tokio::spawn(stage.run(frame_rx));

    let mut assembler = FrameAssembler::new(config.receive_buffer_size);
    let fault = loop {
        tokio::select! {
            fault = fault_rx.recv() => {
                break fault.unwrap_or(SessionFault::TransportFailure);
            }
            outgoing = out_rx.recv() => match outgoing {
                Some(frame) => {
                    if let Err(e) = transport.send(&frame).await {
                        warn!(error = %e, "transport send failed");
                        break SessionFault::TransportFailure;
                    }
                }
                None => break SessionFault::TransportFailure,
            },
            event = transport.next_event() => match event {
                Some(TransportEvent::Connected) => info!("gateway connected"),
                Some(TransportEvent::Data { payload, total_len, offset }) => {
                    // This arm must never block: the queue drops on
                    // overflow instead.
                    if let Some(frame) = assembler.push(&payload, total_len, offset) {
                        frame_tx.push(frame);
                    }
                }
                Some(TransportEvent::Error(e)) => {
                    warn!(error = %e, "transport error");
                    break SessionFault::TransportFailure;
                }
                Some(TransportEvent::Disconnected) | None => {
                    info!("gateway disconnected");
                    break SessionFault::TransportFailure;
                }
            },
        }
    };

    // Teardown: stop the beat, starve the pipeline so every stage
    // drains out, close the transport. Queued items are discarded
    // along with their owned strings.
    pacemaker.abort();
    drop(frame_tx);
    decode_task.abort();
    dispatcher.abort();
    transport.close().await;
    {
        let _ = lock_session(session).phase_mut().begin_reconnect();
    }
    fault
}

// ── Decode stage ─────────────────────────────────────────────────

/// The task that turns raw frames into session mutations and actions.
struct DecodeStage {
    session: SharedSession,
    decoder: FrameDecoder,
    sender: PayloadSender,
    pacemaker: PacemakerHandle,
    cmd_tx: QueueSender<CommandMessage>,
    fault_tx: mpsc::Sender<SessionFault>,
    table: Arc<CommandTable>,
    rest: RestHandle,
    identify: String,
    max_tokens: usize,
}

impl DecodeStage {
    async fn run(self, mut frame_rx: QueueReceiver<Bytes>) {
        while let Some(frame) = frame_rx.pop().await {
            let tokens = match JsonTokenizer::tokenize(&frame, self.max_tokens) {
                Ok(tokens) => tokens,
                Err(TokenError::OutOfMemory) => {
                    warn!(
                        max_tokens = self.max_tokens,
                        "token table overflow, frame discarded"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "malformed frame discarded");
                    continue;
                }
            };

            let actions = {
                let mut s = lock_session(&self.session);
                match self.decoder.decode(&frame, &tokens, &mut s) {
                    Ok(actions) => actions,
                    Err(e) => {
                        warn!(error = %e, "frame decode failed, discarded");
                        continue;
                    }
                }
            };

            for action in actions {
                self.apply(action).await;
            }
        }
    }

    async fn apply(&self, action: GatewayAction) {
        match action {
            GatewayAction::SendHeartbeat => self.pacemaker.beat_now().await,
            GatewayAction::StartHandshake {
                heartbeat_interval_ms,
            } => {
                // Only the first Hello of a session identifies; a
                // later interval announcement just re-paces the beat.
                let first_hello = lock_session(&self.session)
                    .phase_mut()
                    .begin_identify()
                    .is_ok();
                self.pacemaker.set_interval(heartbeat_interval_ms).await;
                if first_hello {
                    info!("logging in");
                    if let Err(e) = self.sender.send_payload(&self.identify).await {
                        warn!(error = %e, "identify send failed");
                        let _ = self.fault_tx.send(SessionFault::TransportFailure).await;
                    }
                }
            }
            GatewayAction::Reconnect => {
                let _ = lock_session(&self.session).phase_mut().begin_reconnect();
                let _ = self.fault_tx.send(SessionFault::ReconnectRequested).await;
            }
            GatewayAction::Command(msg) => {
                self.cmd_tx.push(msg);
            }
            GatewayAction::Help(msg) => self.table.send_help(&msg, &self.rest),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
