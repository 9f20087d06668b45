//! Message-framed duplex transport.
//!
//! Everything above this module talks to a connection through
//! [`Transport`]. The production adapter wraps an axum WebSocket
//! ([`ws::WsTransport`]); tests drive the relay through the channel-backed
//! [`memory::MemoryTransport`].

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure reported by a transport operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer closed the connection, or it was closed locally.
    #[error("connection closed: {0}")]
    Closed(String),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the connection is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// A bidirectional, message-framed connection.
///
/// Implementations serialize concurrent writes so each call produces exactly
/// one complete frame, and make a pending [`receive`](Transport::receive)
/// return once [`close`](Transport::close) has been called.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a text frame.
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Send a ping control frame.
    async fn send_ping(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Wait for the next data frame (text or binary).
    ///
    /// Control frames are consumed internally and never returned.
    async fn receive(&self) -> Result<Bytes, TransportError>;

    /// Close the connection. Calling this more than once is a no-op.
    async fn close(&self);

    /// Send a JSON value as a single text frame.
    async fn send_json(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        let text = serde_json::to_string(value).map_err(|e| TransportError::Io(e.to_string()))?;
        self.send_text(&text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_classification() {
        assert!(TransportError::Closed("bye".into()).is_closed());
        assert!(!TransportError::Io("reset".into()).is_closed());
    }

    #[test]
    fn display() {
        assert_eq!(
            TransportError::Closed("peer went away".into()).to_string(),
            "connection closed: peer went away"
        );
    }
}
