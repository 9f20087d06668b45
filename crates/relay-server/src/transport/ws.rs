//! [`Transport`] adapter over an axum WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError};

/// An upgraded WebSocket split into independently locked halves.
///
/// The sink lock serializes writers. `closed` is cancelled by
/// [`Transport::close`] and wakes any receive still parked on the stream.
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    closed: CancellationToken,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: CancellationToken::new(),
        }
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(closed_locally());
        }
        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            if self.closed.is_cancelled() {
                closed_locally()
            } else {
                TransportError::Io(e.to_string())
            }
        })
    }
}

/// Upper bound on flushing the close frame to a peer that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

fn closed_locally() -> TransportError {
    TransportError::Closed("closed locally".into())
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await
    }

    async fn send_ping(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.send(Message::Ping(Bytes::copy_from_slice(payload))).await
    }

    async fn receive(&self) -> Result<Bytes, TransportError> {
        let mut stream = tokio::select! {
            () = self.closed.cancelled() => return Err(closed_locally()),
            guard = self.stream.lock() => guard,
        };
        loop {
            let next = tokio::select! {
                () = self.closed.cancelled() => return Err(closed_locally()),
                next = stream.next() => next,
            };
            match next {
                None => return Err(TransportError::Closed("stream ended".into())),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Bytes::copy_from_slice(text.as_str().as_bytes()));
                }
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "peer closed".to_string(),
                        |f| format!("peer closed ({}): {}", f.code, f.reason.as_str()),
                    );
                    return Err(TransportError::Closed(reason));
                }
            }
        }
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        // The peer may already be gone; a failed or stuck close frame is expected then.
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;
    }
}
