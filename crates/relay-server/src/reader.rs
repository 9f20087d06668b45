//! Cancellable single-frame read.
//!
//! A transport receive cannot be interrupted in place, so it runs on its own
//! task and reports through a `oneshot`. The caller races that channel
//! against a cancellation token and an optional deadline. When the race is
//! lost the task is detached; the oneshot send never blocks, so the task
//! finishes as soon as its receive does, which closing the transport forces.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::transport::{Transport, TransportError};

/// Why a read did not produce a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The deadline elapsed first.
    #[error("read deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    /// The cancellation token fired first.
    #[error("read cancelled")]
    Cancelled,
    /// The peer closed the connection or it was closed locally.
    #[error("transport closed: {0}")]
    TransportClosed(String),
    /// A transient transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ReadError {
    /// Whether the session reading this connection must end.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

impl From<TransportError> for ReadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed(reason) => Self::TransportClosed(reason),
            TransportError::Io(reason) => Self::Transport(reason),
        }
    }
}

/// Read one frame from `transport`, giving up on cancellation or deadline.
pub async fn read_message(
    transport: &Arc<dyn Transport>,
    cancel: &CancellationToken,
    deadline: Option<Duration>,
) -> Result<Bytes, ReadError> {
    let (tx, rx) = oneshot::channel();
    let reader = Arc::clone(transport);
    let _receive = tokio::spawn(async move {
        let _ = tx.send(reader.receive().await);
    });

    let expired = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReadError::Cancelled),
        result = rx => match result {
            Ok(frame) => frame.map_err(ReadError::from),
            Err(_) => Err(ReadError::TransportClosed("receive task aborted".into())),
        },
        () = expired => Err(ReadError::DeadlineExceeded(deadline.unwrap_or_default())),
    }
}
