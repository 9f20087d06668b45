//! Wire protocol.
//!
//! ## Handshake
//!
//! | Direction | Frame |
//! |-----------|-------|
//! | server → client | `HELLO` |
//! | client → server | `{"id": <uuid>, "name": <string>}` |
//! | server → client | `WELCOME <name>` or `Already connected` |
//!
//! ## Messaging
//!
//! After the handshake clients send [`InboundMessage`] frames. The recipient
//! receives an [`OutboundMessage`]; the sender may receive an [`ErrorNotice`]
//! when routing fails. Liveness probes are ping control frames carrying
//! [`PROBE_PAYLOAD`].

use serde::{Deserialize, Serialize};

use crate::ids::Identity;

/// Greeting sent by the server as soon as the transport is upgraded.
pub const GREETING: &str = "HELLO";

/// Prefix of the acknowledgement sent after a successful registration.
pub const WELCOME_PREFIX: &str = "WELCOME ";

/// Rejection sent when the claimed identity is already registered.
pub const REJECTION: &str = "Already connected";

/// Payload of the heartbeat ping frame.
pub const PROBE_PAYLOAD: &[u8] = b"ping";

/// Error code reported when a post-handshake frame is not a valid message.
pub const MALFORMED_MESSAGE: &str = "MALFORMED_MESSAGE";

/// Build the welcome acknowledgement for an accepted display name.
pub fn welcome(name: &str) -> String {
    format!("{WELCOME_PREFIX}{name}")
}

/// Extract the display name from a welcome acknowledgement.
pub fn parse_welcome(text: &str) -> Option<&str> {
    text.strip_prefix(WELCOME_PREFIX)
}

/// A named participant. Also the shape of the handshake request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identity.
    pub id: Identity,
    /// Display name chosen at handshake time.
    pub name: String,
}

impl Participant {
    /// Create a participant.
    pub fn new(id: Identity, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Client request to relay `msg` from one identity to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Claimed sender.
    #[serde(rename = "fromID")]
    pub from_id: Identity,
    /// Recipient.
    #[serde(rename = "toID")]
    pub to_id: Identity,
    /// Message text.
    pub msg: String,
}

/// Message delivered to a recipient, carrying both parties' display names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Sender as registered at routing time.
    pub from: Participant,
    /// Recipient as registered at routing time.
    pub to: Participant,
    /// Message text.
    pub msg: String,
}

/// Error frame sent back to a sender whose message could not be relayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Error details.
    pub error: ErrorBody,
}

/// Body of an [`ErrorNotice`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code (e.g. `UNKNOWN_RECIPIENT`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorNotice {
    /// Create a notice.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Any JSON frame a client can receive after the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// A relayed message.
    Delivery(OutboundMessage),
    /// A routing failure report.
    Error(ErrorNotice),
}
