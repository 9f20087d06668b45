//! Per-connection session loop.
//!
//! Reads frames, decodes them as [`InboundMessage`]s, and hands them to the
//! router until a critical read failure or cancellation. On exit the
//! session's registry entry is removed (unless it has already been replaced).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use relay_core::protocol::{ErrorNotice, InboundMessage, MALFORMED_MESSAGE};
use relay_core::{Identity, RelayError};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, warn};

use crate::metrics::SESSIONS_ENDED_TOTAL;
use crate::reader::{ReadError, read_message};
use crate::registry::Registry;
use crate::router::MessageRouter;
use crate::transport::Transport;

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session's cancellation token fired.
    Cancelled,
    /// The peer closed the connection (or it was closed locally).
    PeerClosed(String),
    /// A read deadline elapsed.
    DeadlineExceeded,
    /// Too many transient read failures in a row.
    ReadErrors {
        /// Failures observed.
        count: u32,
        /// The last failure.
        last: String,
    },
}

impl SessionEnd {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::PeerClosed(_) => "peer_closed",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ReadErrors { .. } => "read_errors",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::PeerClosed(reason) => write!(f, "peer closed: {reason}"),
            Self::DeadlineExceeded => write!(f, "read deadline exceeded"),
            Self::ReadErrors { count, last } => {
                write!(f, "{count} consecutive read errors, last: {last}")
            }
        }
    }
}

/// Session behavior switches.
#[derive(Clone, Copy, Debug)]
pub struct SessionPolicy {
    /// Consecutive transient read failures tolerated before giving up.
    pub max_consecutive_read_errors: u32,
    /// Reject messages whose `fromID` is not the session identity.
    pub enforce_sender_identity: bool,
    /// Send an [`ErrorNotice`] back when a message cannot be relayed.
    pub notify_route_errors: bool,
    /// Bound on writing an error notice.
    pub write_timeout: Duration,
}

/// Runs session loops against a shared registry and router.
pub struct Session {
    registry: Arc<Registry>,
    router: Arc<MessageRouter>,
    policy: SessionPolicy,
    span: Span,
}

impl Session {
    /// Create a session runner.
    pub fn new(
        registry: Arc<Registry>,
        router: Arc<MessageRouter>,
        policy: SessionPolicy,
        span: Span,
    ) -> Self {
        Self {
            registry,
            router,
            policy,
            span,
        }
    }

    /// Serve `identity` on `transport` until the session terminates.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        identity: Identity,
        transport: &Arc<dyn Transport>,
    ) -> SessionEnd {
        let mut consecutive_errors = 0u32;

        let end = loop {
            match read_message(transport, cancel, None).await {
                Ok(frame) => {
                    consecutive_errors = 0;
                    self.handle_frame(identity, transport, &frame).await;
                }
                Err(ReadError::Transport(reason)) => {
                    consecutive_errors += 1;
                    warn!(
                        parent: &self.span,
                        %identity,
                        error = %reason,
                        consecutive_errors,
                        "transient read failure"
                    );
                    if consecutive_errors >= self.policy.max_consecutive_read_errors {
                        break SessionEnd::ReadErrors {
                            count: consecutive_errors,
                            last: reason,
                        };
                    }
                }
                Err(ReadError::Cancelled) => break SessionEnd::Cancelled,
                Err(ReadError::DeadlineExceeded(_)) => break SessionEnd::DeadlineExceeded,
                Err(ReadError::TransportClosed(reason)) => break SessionEnd::PeerClosed(reason),
            }
        };

        let _ = self.registry.remove_connection(identity, transport).await;
        metrics::counter!(SESSIONS_ENDED_TOTAL, "reason" => end.label()).increment(1);
        info!(parent: &self.span, %identity, reason = %end, "session ended");
        end
    }

    async fn handle_frame(&self, identity: Identity, transport: &Arc<dyn Transport>, frame: &[u8]) {
        let message: InboundMessage = match serde_json::from_slice(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(parent: &self.span, %identity, error = %e, "undecodable message");
                self.notify(transport, ErrorNotice::new(MALFORMED_MESSAGE, e.to_string()))
                    .await;
                return;
            }
        };

        let result = if self.policy.enforce_sender_identity && message.from_id != identity {
            Err(RelayError::SenderMismatch {
                claimed: message.from_id,
                bound: identity,
            })
        } else {
            self.router.route(&message).await
        };

        if let Err(err) = result {
            if err.is_routing_error() {
                debug!(
                    parent: &self.span,
                    %identity,
                    to = %message.to_id,
                    code = err.code(),
                    error = %err,
                    "message not relayed"
                );
            } else {
                warn!(
                    parent: &self.span,
                    %identity,
                    to = %message.to_id,
                    code = err.code(),
                    error = %err,
                    "message not relayed"
                );
            }
            self.notify(transport, ErrorNotice::from(&err)).await;
        }
    }

    async fn notify(&self, transport: &Arc<dyn Transport>, notice: ErrorNotice) {
        if !self.policy.notify_route_errors {
            return;
        }
        let Ok(payload) = serde_json::to_value(&notice) else {
            return;
        };
        match tokio::time::timeout(self.policy.write_timeout, transport.send_json(&payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(parent: &self.span, error = %e, "error notice not delivered"),
            Err(_) => debug!(parent: &self.span, "error notice timed out"),
        }
    }
}
