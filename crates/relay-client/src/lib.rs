//! # relay-client
//!
//! Client side of the relay protocol: the handshake exchange, turning typed
//! lines into routed messages, and rendering server frames for a terminal.

#![deny(unsafe_code)]

use futures::{SinkExt, StreamExt};
use relay_core::protocol::{self, ServerFrame};
use relay_core::{Identity, InboundMessage};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// WebSocket stream returned by [`join`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures while connecting to a relay.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting, reading or writing the socket failed.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The server opened with something other than the greeting.
    #[error("expected HELLO greeting, got {0:?}")]
    UnexpectedGreeting(String),

    /// Another connection already holds the identity.
    #[error("identity is already connected")]
    Rejected,

    /// The server answered the handshake with an unknown reply.
    #[error("unexpected handshake reply: {0:?}")]
    UnexpectedReply(String),

    /// The server closed the connection mid-handshake.
    #[error("connection closed during handshake")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Check the server's opening frame.
pub fn check_greeting(text: &str) -> Result<(), ClientError> {
    if text == protocol::GREETING {
        Ok(())
    } else {
        Err(ClientError::UnexpectedGreeting(text.to_owned()))
    }
}

/// The handshake request: `{"id": <uuid>, "name": <name>}`.
pub fn handshake_payload(id: Identity, name: &str) -> String {
    serde_json::json!({ "id": id, "name": name }).to_string()
}

/// Interpret the reply to the handshake, returning the welcomed name.
pub fn parse_reply(text: &str) -> Result<String, ClientError> {
    if text == protocol::REJECTION {
        return Err(ClientError::Rejected);
    }
    protocol::parse_welcome(text)
        .map(str::to_owned)
        .ok_or_else(|| ClientError::UnexpectedReply(text.to_owned()))
}

/// Build the routed message for one input line. Blank lines yield `None`.
pub fn compose(from: Identity, to: Identity, line: &str) -> Option<InboundMessage> {
    let msg = line.trim_end_matches(['\r', '\n']);
    if msg.trim().is_empty() {
        return None;
    }
    Some(InboundMessage {
        from_id: from,
        to_id: to,
        msg: msg.to_owned(),
    })
}

/// Render a server frame for display.
///
/// Deliveries print as `<from name>: <msg>`, error notices as
/// `error [<CODE>]: <message>`. Anything else is shown verbatim.
pub fn render(text: &str) -> String {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::Delivery(delivery)) => format!("{}: {}", delivery.from.name, delivery.msg),
        Ok(ServerFrame::Error(notice)) => {
            format!("error [{}]: {}", notice.error.code, notice.error.message)
        }
        Err(_) => text.to_owned(),
    }
}

/// Next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> Result<String, ClientError> {
    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ClientError::Closed)
}

/// Connect to `url` and complete the handshake as `id`/`name`.
///
/// Returns the open stream and the name the server welcomed.
pub async fn join(url: &str, id: Identity, name: &str) -> Result<(WsStream, String), ClientError> {
    let (mut ws, _) = connect_async(url).await?;
    check_greeting(&next_text(&mut ws).await?)?;

    ws.send(Message::text(handshake_payload(id, name))).await?;
    let welcomed = parse_reply(&next_text(&mut ws).await?)?;

    tracing::debug!(%id, name = %welcomed, "joined relay");
    Ok((ws, welcomed))
}
