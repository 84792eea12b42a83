//! Integration tests — full session lifecycle over a scripted
//! transport: handshake, command round-trips, chunked reassembly, and
//! server-forced reconnects.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use warble_core::{
    GatewayClient, GatewayConfig, HttpClient, Transport, TransportEvent, WarbleError,
    lock_session,
};

// ── Doubles ──────────────────────────────────────────────────────

/// Transport fed by the test through a channel; outbound frames come
/// back out on another channel.
struct ScriptedTransport {
    incoming: mpsc::Receiver<TransportEvent>,
    sent: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    connect_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self, _uri: &str) -> Result<(), WarbleError> {
        self.connected.store(true, Ordering::SeqCst);
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<usize, WarbleError> {
        let _ = self.sent.send(payload.to_vec()).await;
        Ok(payload.len())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.incoming.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Records REST calls and always answers 200.
struct RecordingHttp {
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl HttpClient for RecordingHttp {
    async fn post(
        &self,
        path: &str,
        _auth_header: &str,
        json_body: &str,
    ) -> Result<u16, WarbleError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), json_body.to_string()));
        Ok(200)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

struct Rig {
    events: mpsc::Sender<TransportEvent>,
    sent: mpsc::Receiver<Vec<u8>>,
    http: Arc<RecordingHttp>,
    connect_count: Arc<AtomicUsize>,
    session: warble_core::SharedSession,
}

fn config() -> GatewayConfig {
    GatewayConfig {
        auth_token: "test-token".into(),
        command_prefix: "!cast ".into(),
        case_sensitive: false,
        // Keep the tests fast; pacing itself is unit-tested.
        min_send_spacing: Duration::ZERO,
        reconnect_backoff_min: Duration::from_millis(100),
        ..GatewayConfig::default()
    }
}

/// Build a client with a `ping` command registered and set it
/// running.
fn launch(cfg: GatewayConfig) -> Rig {
    let (event_tx, event_rx) = mpsc::channel(64);
    let (sent_tx, sent_rx) = mpsc::channel(64);
    let connect_count = Arc::new(AtomicUsize::new(0));
    let transport = ScriptedTransport {
        incoming: event_rx,
        sent: sent_tx,
        connected: Arc::new(AtomicBool::new(false)),
        connect_count: Arc::clone(&connect_count),
    };
    let http = Arc::new(RecordingHttp {
        calls: Mutex::new(Vec::new()),
    });

    let mut client = GatewayClient::new(cfg, transport, Arc::clone(&http) as Arc<dyn HttpClient>);
    client.commands().register("ping", |msg, rest| {
        Box::pin(async move {
            rest.post_text(&msg.channel_id, &format!("pong {}", msg.author_mention));
        })
    });
    let session = client.session();
    tokio::spawn(client.run());

    Rig {
        events: event_tx,
        sent: sent_rx,
        http,
        connect_count,
        session,
    }
}

fn frame(json: &str) -> TransportEvent {
    TransportEvent::Data {
        payload: Bytes::copy_from_slice(json.as_bytes()),
        total_len: json.len(),
        offset: 0,
    }
}

const HELLO: &str = r#"{"t":null,"s":null,"op":10,"d":{"heartbeat_interval":41250}}"#;
const READY: &str = r#"{"t":"READY","s":1,"op":0,"d":{"v":9,"session_id":"cafe"}}"#;

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_handshake_sends_heartbeat_and_identify() {
    let mut rig = launch(config());
    rig.events.send(frame(HELLO)).await.unwrap();

    // One immediate heartbeat plus the login payload, in either
    // order (pacemaker and decode task race benignly).
    let a: Value = serde_json::from_slice(&rig.sent.recv().await.unwrap()).unwrap();
    let b: Value = serde_json::from_slice(&rig.sent.recv().await.unwrap()).unwrap();
    let mut ops = [a["op"].as_u64().unwrap(), b["op"].as_u64().unwrap()];
    ops.sort_unstable();
    assert_eq!(ops, [1, 2]);

    let identify = if a["op"] == 2 { a } else { b };
    assert_eq!(identify["d"]["token"], "test-token");

    rig.events.send(frame(READY)).await.unwrap();
    wait_until(
        || lock_session(&rig.session).session_id() == Some("cafe"),
        "READY capture",
    )
    .await;
    assert!(lock_session(&rig.session).phase().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_command_round_trip_reaches_rest() {
    let mut rig = launch(config());
    rig.events.send(frame(HELLO)).await.unwrap();
    rig.sent.recv().await.unwrap();
    rig.sent.recv().await.unwrap();
    rig.events.send(frame(READY)).await.unwrap();

    let msg = r#"{"t":"MESSAGE_CREATE","s":7,"op":0,"d":{"content":"!CAST ping","channel_id":"123","author":{"username":"bob","id":"2"},"type":0}}"#;
    rig.events.send(frame(msg)).await.unwrap();

    wait_until(
        || !rig.http.calls.lock().unwrap().is_empty(),
        "REST reply",
    )
    .await;
    let calls = rig.http.calls.lock().unwrap();
    assert_eq!(calls[0].0, "/api/v10/channels/123/messages");
    assert!(calls[0].1.contains("pong <@2>"));
}

#[tokio::test(start_paused = true)]
async fn test_chunked_frame_is_reassembled_before_decoding() {
    let mut rig = launch(config());
    rig.events.send(frame(HELLO)).await.unwrap();
    rig.sent.recv().await.unwrap();
    rig.sent.recv().await.unwrap();
    rig.events.send(frame(READY)).await.unwrap();

    let msg = r#"{"t":"MESSAGE_CREATE","s":8,"op":0,"d":{"content":"!cast ping","channel_id":"9","author":{"username":"eve","id":"5"},"type":0}}"#;
    let bytes = msg.as_bytes();
    let mid = bytes.len() / 2;
    rig.events
        .send(TransportEvent::Data {
            payload: Bytes::copy_from_slice(&bytes[..mid]),
            total_len: bytes.len(),
            offset: 0,
        })
        .await
        .unwrap();
    rig.events
        .send(TransportEvent::Data {
            payload: Bytes::copy_from_slice(&bytes[mid..]),
            total_len: bytes.len(),
            offset: mid,
        })
        .await
        .unwrap();

    wait_until(
        || !rig.http.calls.lock().unwrap().is_empty(),
        "REST reply from chunked frame",
    )
    .await;
    assert_eq!(
        rig.http.calls.lock().unwrap()[0].0,
        "/api/v10/channels/9/messages"
    );
}

#[tokio::test(start_paused = true)]
async fn test_sequence_regressions_are_logged_not_stored() {
    let rig = launch(config());
    rig.events.send(frame(HELLO)).await.unwrap();

    let high = r#"{"t":"MESSAGE_CREATE","s":9,"op":0,"d":{"content":"hello","channel_id":"1","author":{"username":"a","id":"1"},"type":0}}"#;
    let low = r#"{"t":"MESSAGE_CREATE","s":3,"op":0,"d":{"content":"hello","channel_id":"1","author":{"username":"a","id":"1"},"type":0}}"#;
    rig.events.send(frame(high)).await.unwrap();
    wait_until(
        || lock_session(&rig.session).sequence() == Some(9),
        "sequence update",
    )
    .await;
    rig.events.send(frame(low)).await.unwrap();

    // Give the decode task time to (not) regress.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(lock_session(&rig.session).sequence(), Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_server_reconnect_tears_down_and_redials() {
    let rig = launch(config());
    rig.events.send(frame(HELLO)).await.unwrap();
    wait_until(|| rig.connect_count.load(Ordering::SeqCst) == 1, "first dial").await;

    rig.events
        .send(frame(r#"{"t":null,"s":null,"op":7,"d":null}"#))
        .await
        .unwrap();

    wait_until(
        || rig.connect_count.load(Ordering::SeqCst) == 2,
        "redial after reconnect opcode",
    )
    .await;
    // The dead session's identity is gone.
    assert!(lock_session(&rig.session).session_id().is_none());
}
