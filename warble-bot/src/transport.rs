//! WebSocket transport backing the engine's `Transport` contract.
//!
//! tokio-tungstenite already hands us whole messages, so every
//! inbound payload is delivered as a single complete chunk
//! (`offset == 0`, `total_len == len`) and the engine's reassembly
//! passes it straight through.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use warble_core::{Transport, TransportEvent, WarbleError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One gateway WebSocket connection at a time.
#[derive(Default)]
pub struct WsTransport {
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self, uri: &str) -> Result<(), WarbleError> {
        let (stream, response) = connect_async(uri)
            .await
            .map_err(|e| WarbleError::Transport(e.to_string()))?;
        debug!(status = %response.status(), "websocket upgrade complete");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<usize, WarbleError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(WarbleError::Transport("not connected".into()));
        };
        let text = std::str::from_utf8(payload)?;
        stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| WarbleError::Transport(e.to_string()))?;
        Ok(payload.len())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let item = self.stream.as_mut()?.next().await;
            match item {
                None => {
                    self.stream = None;
                    return Some(TransportEvent::Disconnected);
                }
                Some(Ok(Message::Text(text))) => {
                    let total_len = text.len();
                    return Some(TransportEvent::Data {
                        payload: Bytes::from(text.into_bytes()),
                        total_len,
                        offset: 0,
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    let total_len = data.len();
                    return Some(TransportEvent::Data {
                        payload: Bytes::from(data),
                        total_len,
                        offset: 0,
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "close frame from gateway");
                    self.stream = None;
                    return Some(TransportEvent::Disconnected);
                }
                // Ping/pong are answered by the library on flush.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(TransportEvent::Error(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
