//! # relay-core
//!
//! Foundation types shared by every relay crate:
//!
//! - **Identity**: [`Identity`] newtype over a client-supplied UUID
//! - **Protocol**: handshake literals and the JSON frames exchanged after it
//! - **Errors**: [`RelayError`] taxonomy with stable machine codes
//! - **Logging**: `tracing` subscriber setup and an in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{RelayError, Result};
pub use ids::Identity;
pub use protocol::{ErrorNotice, InboundMessage, OutboundMessage, Participant};
