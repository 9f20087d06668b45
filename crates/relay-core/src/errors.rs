//! Error taxonomy for the relay.
//!
//! Every variant carries a stable machine code (see [`RelayError::code`]) used
//! both in error notices sent to clients and in HTTP error bodies.

use std::time::Duration;

use thiserror::Error;

use crate::ids::Identity;
use crate::protocol::ErrorNotice;

/// Errors surfaced by the relay core and its HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The client did not send its identity within the handshake window.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The identity payload could not be decoded.
    #[error("malformed handshake payload: {0}")]
    HandshakeMalformed(String),

    /// Another connection already holds this identity.
    #[error("identity {0} is already connected")]
    IdentityConflict(Identity),

    /// The sender of a routed message is not registered.
    #[error("unknown sender {0}")]
    UnknownSender(Identity),

    /// The recipient of a routed message is not registered.
    #[error("unknown recipient {0}")]
    UnknownRecipient(Identity),

    /// A routed message claimed a sender other than the session's identity.
    #[error("sender {claimed} does not match session identity {bound}")]
    SenderMismatch {
        /// Identity named in `fromID`.
        claimed: Identity,
        /// Identity bound to the connection at handshake.
        bound: Identity,
    },

    /// The peer closed the connection or the network failed.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Writing to the recipient failed.
    #[error("delivery to {recipient} failed: {reason}")]
    DeliveryFailed {
        /// Intended recipient.
        recipient: Identity,
        /// Underlying failure.
        reason: String,
    },

    /// The connection limit has been reached.
    #[error("relay is at capacity ({0} connections)")]
    AtCapacity(usize),

    /// The relay is draining and accepts no new connections.
    #[error("relay is shutting down")]
    ShuttingDown,
}

impl RelayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::HandshakeTimeout(_) => "HANDSHAKE_TIMEOUT",
            Self::HandshakeMalformed(_) => "HANDSHAKE_MALFORMED",
            Self::IdentityConflict(_) => "IDENTITY_CONFLICT",
            Self::UnknownSender(_) => "UNKNOWN_SENDER",
            Self::UnknownRecipient(_) => "UNKNOWN_RECIPIENT",
            Self::SenderMismatch { .. } => "SENDER_MISMATCH",
            Self::TransportClosed(_) => "TRANSPORT_CLOSED",
            Self::DeliveryFailed { .. } => "DELIVERY_FAILED",
            Self::AtCapacity(_) => "AT_CAPACITY",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// HTTP status used when this error is reported by the web layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::HandshakeMalformed(_) => 400,
            Self::IdentityConflict(_) => 409,
            Self::UnknownSender(_) | Self::UnknownRecipient(_) => 404,
            Self::SenderMismatch { .. } => 403,
            Self::HandshakeTimeout(_) => 408,
            Self::DeliveryFailed { .. } | Self::TransportClosed(_) => 502,
            Self::AtCapacity(_) | Self::ShuttingDown => 503,
        }
    }

    /// Whether the error came out of routing a single message.
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownSender(_)
                | Self::UnknownRecipient(_)
                | Self::SenderMismatch { .. }
                | Self::DeliveryFailed { .. }
        )
    }
}

impl From<&RelayError> for ErrorNotice {
    fn from(err: &RelayError) -> Self {
        ErrorNotice::new(err.code(), err.to_string())
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
