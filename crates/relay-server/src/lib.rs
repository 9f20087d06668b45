//! # relay-server
//!
//! The relay core and its axum host.
//!
//! - **Transport**: [`transport::Transport`] over an axum WebSocket, plus an
//!   in-memory implementation for tests
//! - **Registry**: identity → connection map behind one `RwLock`
//! - **Handshake**: `HELLO` / identity / `WELCOME` with a bounded wait
//! - **Reader**: a receive raced against cancellation and a deadline
//! - **Router**: sender/recipient lookup and a bounded delivery write
//! - **Heartbeat**: periodic ping sweep evicting dead connections
//! - **Session**: per-connection read/decode/route loop
//! - **Server**: `/connect`, `/health`, `/metrics` with tower-http middleware
//!   and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handshake;
pub mod health;
pub mod heartbeat;
pub mod metrics;
pub mod reader;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use config::{RelayConfig, ServerConfig};
pub use relay::Relay;
pub use server::RelayServer;
pub use session::SessionEnd;
