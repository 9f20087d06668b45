//! Handshake: bind a freshly upgraded transport to an identity.
//!
//! ```text
//! server: HELLO
//! client: {"id": "...", "name": "..."}   (within the handshake timeout)
//! server: WELCOME <name> | Already connected
//! ```
//!
//! Every failure closes the transport. The registry is only touched on
//! success, or to undo our own insertion when the welcome cannot be written.

use std::sync::Arc;
use std::time::Duration;

use relay_core::protocol::{self, Participant};
use relay_core::{Identity, RelayError};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};

use crate::metrics::{HANDSHAKE_FAILURES_TOTAL, HANDSHAKES_TOTAL};
use crate::reader::{ReadError, read_message};
use crate::registry::Registry;
use crate::transport::Transport;

/// Runs the handshake against a shared registry.
pub struct Handshake {
    registry: Arc<Registry>,
    timeout: Duration,
    span: Span,
}

impl Handshake {
    /// Create a handshake waiting at most `timeout` for the identity payload.
    pub fn new(registry: Arc<Registry>, timeout: Duration, span: Span) -> Self {
        Self {
            registry,
            timeout,
            span,
        }
    }

    /// Negotiate an identity and register the connection.
    pub async fn negotiate(
        &self,
        transport: Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Participant, RelayError> {
        let result = self.run(&transport, cancel).await;
        match &result {
            Ok(participant) => {
                metrics::counter!(HANDSHAKES_TOTAL).increment(1);
                info!(parent: &self.span, identity = %participant.id, name = %participant.name, "handshake complete");
            }
            Err(err) => {
                metrics::counter!(HANDSHAKE_FAILURES_TOTAL, "code" => err.code()).increment(1);
                warn!(parent: &self.span, error = %err, code = err.code(), "handshake failed");
            }
        }
        result
    }

    async fn run(
        &self,
        transport: &Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Participant, RelayError> {
        if let Err(e) = transport.send_text(protocol::GREETING).await {
            transport.close().await;
            return Err(RelayError::TransportClosed(e.to_string()));
        }

        let payload = match read_message(transport, cancel, Some(self.timeout)).await {
            Ok(payload) => payload,
            Err(e) => {
                transport.close().await;
                return Err(match e {
                    ReadError::DeadlineExceeded(limit) => RelayError::HandshakeTimeout(limit),
                    ReadError::Cancelled => RelayError::ShuttingDown,
                    ReadError::TransportClosed(reason) | ReadError::Transport(reason) => {
                        RelayError::TransportClosed(reason)
                    }
                });
            }
        };

        let participant: Participant = match serde_json::from_slice(&payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(parent: &self.span, error = %e, "undecodable identity payload");
                transport.close().await;
                return Err(RelayError::HandshakeMalformed(e.to_string()));
            }
        };

        if let Err(conflict) = self
            .registry
            .add(participant.id, participant.name.clone(), Arc::clone(transport))
            .await
        {
            // Best effort; the connection is being dropped either way.
            let _ = transport.send_text(protocol::REJECTION).await;
            transport.close().await;
            return Err(conflict);
        }

        if let Err(e) = transport.send_text(&protocol::welcome(&participant.name)).await {
            let _ = self
                .registry
                .remove_connection(participant.id, transport)
                .await;
            transport.close().await;
            return Err(RelayError::TransportClosed(e.to_string()));
        }

        Ok(participant)
    }

    /// Identity-only convenience over [`negotiate`](Self::negotiate).
    pub async fn open(
        &self,
        transport: Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Identity, RelayError> {
        self.negotiate(transport, cancel).await.map(|p| p.id)
    }
}
