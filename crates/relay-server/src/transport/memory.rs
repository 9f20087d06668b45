//! In-memory [`Transport`] for tests.
//!
//! [`MemoryTransport::pair`] returns the server-side transport and a
//! [`MemoryPeer`] standing in for the remote client. Frames the relay writes
//! show up on the peer; frames the peer sends are returned by `receive`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError};

/// A frame written by the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Ping control frame.
    Ping(Vec<u8>),
}

impl Frame {
    /// Text content, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Ping(_) => None,
        }
    }

    /// Parse a text frame as JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        self.as_text().and_then(|t| serde_json::from_str(t).ok())
    }
}

/// Server side of an in-memory connection.
pub struct MemoryTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>,
    outbound: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
    close_count: AtomicUsize,
    writes: AtomicUsize,
    fail_from: AtomicUsize,
    stall_writes: AtomicBool,
    stall_close: AtomicBool,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Bytes, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (Arc<Self>, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            closed: CancellationToken::new(),
            close_count: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail_from: AtomicUsize::new(usize::MAX),
            stall_writes: AtomicBool::new(false),
            stall_close: AtomicBool::new(false),
        });
        let peer = MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
        };
        (transport, peer)
    }

    /// Make every subsequent write fail with [`TransportError::Io`].
    pub fn fail_writes(&self, fail: bool) {
        let from = if fail { 0 } else { usize::MAX };
        self.fail_from.store(from, Ordering::SeqCst);
    }

    /// Let the next `n` writes through, then fail every write after them.
    pub fn fail_writes_after(&self, n: usize) {
        let from = self.writes.load(Ordering::SeqCst).saturating_add(n);
        self.fail_from.store(from, Ordering::SeqCst);
    }

    /// Make every subsequent write hang until the transport is closed.
    pub fn stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    /// Make [`Transport::close`] mark the transport closed and then never return,
    /// like a close handshake stuck behind a full send buffer.
    pub fn stall_close(&self, stall: bool) {
        self.stall_close.store(stall, Ordering::SeqCst);
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of times the transport actually transitioned to closed.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed("closed locally".into()));
        }
        if self.stall_writes.load(Ordering::SeqCst) {
            self.closed.cancelled().await;
            return Err(TransportError::Closed("closed locally".into()));
        }
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.fail_from.load(Ordering::SeqCst) {
            return Err(TransportError::Io("injected write failure".into()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed("peer dropped".into()))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.write(Frame::Text(text.to_string())).await
    }

    async fn send_ping(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.write(Frame::Ping(payload.to_vec())).await
    }

    async fn receive(&self) -> Result<Bytes, TransportError> {
        let closed = || TransportError::Closed("closed locally".into());
        let mut inbound = tokio::select! {
            () = self.closed.cancelled() => return Err(closed()),
            guard = self.inbound.lock() => guard,
        };
        tokio::select! {
            () = self.closed.cancelled() => Err(closed()),
            next = inbound.recv() => {
                next.unwrap_or_else(|| Err(TransportError::Closed("peer disconnected".into())))
            }
        }
    }

    async fn close(&self) {
        if self
            .close_count
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.closed.cancel();
        }
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

impl MemoryPeer {
    /// Deliver a text frame to the relay.
    pub fn send_text(&self, text: impl Into<String>) {
        self.push(Ok(Bytes::from(text.into())));
    }

    /// Deliver a JSON value as a text frame.
    pub fn send_json(&self, value: &serde_json::Value) {
        self.send_text(value.to_string());
    }

    /// Make the relay's next receive fail with `error`.
    pub fn send_error(&self, error: TransportError) {
        self.push(Err(error));
    }

    /// Hang up: pending and future receives report the peer as closed.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Wait for the next frame written by the relay.
    ///
    /// Returns `None` once the server side has been dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    fn push(&self, item: Result<Bytes, TransportError>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (transport, mut peer) = MemoryTransport::pair();
        peer.send_text("hi");
        assert_eq!(transport.receive().await.unwrap(), Bytes::from("hi"));

        transport.send_text("HELLO").await.unwrap();
        transport.send_ping(b"ping").await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("HELLO".into())));
        assert_eq!(peer.recv().await, Some(Frame::Ping(b"ping".to_vec())));
    }

    #[tokio::test]
    async fn close_wakes_pending_receive() {
        let (transport, _peer) = MemoryTransport::pair();
        let reader = Arc::clone(&transport);
        let pending = tokio::spawn(async move { reader.receive().await });
        tokio::task::yield_now().await;

        transport.close().await;
        assert_matches!(pending.await.unwrap(), Err(TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn close_is_counted_once() {
        let (transport, _peer) = MemoryTransport::pair();
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_close_still_marks_closed() {
        let (transport, _peer) = MemoryTransport::pair();
        transport.stall_close(true);
        let closing = tokio::time::timeout(Duration::from_secs(1), transport.close()).await;
        assert!(closing.is_err());
        assert!(transport.is_closed());
        assert_matches!(transport.send_text("x").await, Err(TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn disconnect_reports_closed() {
        let (transport, mut peer) = MemoryTransport::pair();
        peer.disconnect();
        assert_matches!(transport.receive().await, Err(TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn injected_failures() {
        let (transport, peer) = MemoryTransport::pair();
        transport.fail_writes(true);
        assert_matches!(transport.send_text("x").await, Err(TransportError::Io(_)));

        transport.fail_writes(false);
        transport.fail_writes_after(1);
        assert!(transport.send_text("one").await.is_ok());
        assert_matches!(transport.send_text("two").await, Err(TransportError::Io(_)));

        peer.send_error(TransportError::Io("glitch".into()));
        assert_matches!(transport.receive().await, Err(TransportError::Io(m)) if m == "glitch");
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let (transport, _peer) = MemoryTransport::pair();
        transport.close().await;
        assert_matches!(transport.send_text("x").await, Err(TransportError::Closed(_)));
    }

    #[tokio::test]
    async fn send_json_is_one_text_frame() {
        let (transport, mut peer) = MemoryTransport::pair();
        transport
            .send_json(&serde_json::json!({"msg": "hi"}))
            .await
            .unwrap();
        let frame = peer.recv().await.unwrap();
        assert_eq!(frame.json().unwrap()["msg"], "hi");
    }
}
