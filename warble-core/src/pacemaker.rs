//! The pacemaker: heartbeat emission and liveness detection.
//!
//! A dedicated task beats at the cadence the server dictates. Each
//! beat first checks that the previous one was acknowledged; if not,
//! the connection is presumed dead and the pacemaker raises a
//! liveness fault instead of beating a corpse. The timer re-arms from
//! the moment of each send, so processing jitter never accumulates
//! into drift.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::outbound::PayloadSender;
use crate::payload::heartbeat_json;
use crate::session::{SessionFault, SharedSession, lock_session};

// ── Control ──────────────────────────────────────────────────────

enum PacemakerCtrl {
    /// New cadence from Hello. Fires one immediate beat, then rearms.
    SetInterval(u32),
    /// Server-requested out-of-cycle beat.
    BeatNow,
}

/// Cloneable control handle held by the decode task.
#[derive(Clone)]
pub struct PacemakerHandle {
    ctrl: mpsc::Sender<PacemakerCtrl>,
}

impl PacemakerHandle {
    /// Set the heartbeat cadence. The pacemaker sends exactly one
    /// immediate beat (the interval only changes right after a
    /// handshake, and an immediate beat re-synchronizes timing), then
    /// rearms to the new period.
    pub async fn set_interval(&self, interval_ms: u32) {
        if self
            .ctrl
            .send(PacemakerCtrl::SetInterval(interval_ms))
            .await
            .is_err()
        {
            debug!("pacemaker already stopped, interval ignored");
        }
    }

    /// Emit one beat now, outside the cycle, without touching the
    /// acknowledgement state.
    pub async fn beat_now(&self) {
        if self.ctrl.send(PacemakerCtrl::BeatNow).await.is_err() {
            debug!("pacemaker already stopped, beat ignored");
        }
    }
}

// ── Pacemaker ────────────────────────────────────────────────────

/// The running pacemaker task plus its control handle.
pub struct Pacemaker {
    handle: PacemakerHandle,
    task: JoinHandle<()>,
}

impl Pacemaker {
    /// Spawn the pacemaker. It stays dormant (no timer) until the
    /// first `set_interval`.
    pub fn spawn(
        session: SharedSession,
        sender: PayloadSender,
        fault_tx: mpsc::Sender<SessionFault>,
    ) -> Self {
        let (ctrl_tx, ctrl_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(session, sender, fault_tx, ctrl_rx));
        Self {
            handle: PacemakerHandle { ctrl: ctrl_tx },
            task,
        }
    }

    pub fn handle(&self) -> PacemakerHandle {
        self.handle.clone()
    }

    /// Stop beating immediately. Used on session teardown.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run(
    session: SharedSession,
    sender: PayloadSender,
    fault_tx: mpsc::Sender<SessionFault>,
    mut ctrl_rx: mpsc::Receiver<PacemakerCtrl>,
) {
    // No cadence until Hello tells us one.
    let mut interval: Option<Duration> = None;

    loop {
        let timer_fired = tokio::select! {
            ctrl = ctrl_rx.recv() => match ctrl {
                None => return,
                Some(PacemakerCtrl::SetInterval(ms)) => {
                    info!(interval_ms = ms, "pacemaker cadence set");
                    interval = Some(Duration::from_millis(u64::from(ms)));
                    true
                }
                Some(PacemakerCtrl::BeatNow) => {
                    forced_beat(&session, &sender).await;
                    false
                }
            },
            () = wait_for_fire(interval) => true,
        };

        if timer_fired && !beat(&session, &sender, &fault_tx).await {
            return;
        }
        // The next sleep is constructed after the beat completed, so
        // the period is measured from the send.
    }
}

async fn wait_for_fire(interval: Option<Duration>) {
    match interval {
        Some(period) => sleep(period).await,
        None => std::future::pending().await,
    }
}

/// One regular beat. Returns `false` when the session is presumed
/// dead — the pacemaker must not beat a dead connection again.
async fn beat(
    session: &SharedSession,
    sender: &PayloadSender,
    fault_tx: &mpsc::Sender<SessionFault>,
) -> bool {
    let armed = lock_session(session).arm_heartbeat();
    match armed {
        None => {
            warn!("heartbeat not acknowledged in time, reconnecting");
            let _ = fault_tx.send(SessionFault::LivenessFailure).await;
            false
        }
        Some(sequence) => {
            debug!(?sequence, "heartbeat");
            if let Err(e) = sender.send_payload(&heartbeat_json(sequence)).await {
                // The writer will surface the transport failure; keep
                // beating until the engine tears us down.
                warn!(error = %e, "heartbeat send failed");
            }
            true
        }
    }
}

/// Server-requested beat: emitted immediately, acknowledgement state
/// untouched.
async fn forced_beat(session: &SharedSession, sender: &PayloadSender) {
    let sequence = lock_session(session).sequence();
    debug!(?sequence, "out-of-cycle heartbeat");
    if let Err(e) = sender.send_payload(&heartbeat_json(sequence)).await {
        warn!(error = %e, "heartbeat send failed");
    }
}

// ── Tests ────────────────────────────────────────────────────────
