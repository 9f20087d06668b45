//! Identity → connection registry.
//!
//! The registry is the single source of truth for who is connected. All
//! access goes through one `RwLock`; it is held only for map operations and
//! never across a network write. Closing an evicted transport happens after
//! the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relay_core::protocol::Participant;
use relay_core::{Identity, RelayError};
use tokio::sync::RwLock;
use tracing::{Span, debug, info, warn};

use crate::metrics::CONNECTIONS_ACTIVE;
use crate::transport::Transport;

/// A registered connection.
pub struct Connection {
    identity: Identity,
    name: String,
    transport: Arc<dyn Transport>,
}

impl Connection {
    /// Identity bound at handshake.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Display name chosen at handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// `{id, name}` view used in outbound messages.
    pub fn participant(&self) -> Participant {
        Participant::new(self.identity, self.name.clone())
    }

    fn owns(&self, transport: &Arc<dyn Transport>) -> bool {
        Arc::ptr_eq(&self.transport, transport)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How long a removal waits for the evicted transport to close.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Concurrent map of live connections keyed by identity.
pub struct Registry {
    connections: RwLock<HashMap<Identity, Arc<Connection>>>,
    close_timeout: Duration,
    span: Span,
}

impl Registry {
    /// Create an empty registry logging under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            span,
        }
    }

    /// Bound the wait for an evicted transport's close.
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Register a connection. Never overwrites an existing entry.
    pub async fn add(
        &self,
        identity: Identity,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Connection>, RelayError> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&identity) {
            debug!(parent: &self.span, %identity, "identity already registered");
            return Err(RelayError::IdentityConflict(identity));
        }
        let connection = Arc::new(Connection {
            identity,
            name: name.into(),
            transport,
        });
        let _ = connections.insert(identity, Arc::clone(&connection));
        let count = connections.len();
        drop(connections);

        record_count(count);
        info!(parent: &self.span, %identity, name = connection.name(), count, "connection registered");
        Ok(connection)
    }

    /// Remove `identity` and close its transport.
    ///
    /// Returns `false` (and does nothing) when the identity is not registered.
    pub async fn remove(&self, identity: Identity) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&identity);
        let count = connections.len();
        drop(connections);

        self.finish_removal(removed, count).await
    }

    /// Remove `identity` only if it is still bound to `transport`.
    ///
    /// Used by tasks holding a possibly stale view (the sweeper's snapshot,
    /// a session whose entry may have been evicted and re-registered).
    pub async fn remove_connection(&self, identity: Identity, transport: &Arc<dyn Transport>) -> bool {
        let mut connections = self.connections.write().await;
        let removed = match connections.get(&identity) {
            Some(existing) if existing.owns(transport) => connections.remove(&identity),
            _ => None,
        };
        let count = connections.len();
        drop(connections);

        self.finish_removal(removed, count).await
    }

    async fn finish_removal(&self, removed: Option<Arc<Connection>>, count: usize) -> bool {
        let Some(connection) = removed else {
            return false;
        };
        record_count(count);
        info!(parent: &self.span, identity = %connection.identity, count, "connection removed");
        let closing = connection.transport.close();
        if tokio::time::timeout(self.close_timeout, closing).await.is_err() {
            warn!(
                parent: &self.span,
                identity = %connection.identity,
                timeout_ms = u64::try_from(self.close_timeout.as_millis()).unwrap_or(u64::MAX),
                "transport close timed out"
            );
        }
        true
    }

    /// Point-in-time copy of every registered connection.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Look up a single connection.
    pub async fn lookup(&self, identity: Identity) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&identity).cloned()
    }

    /// Resolve sender and recipient under one read lock, sender first.
    pub async fn resolve_pair(
        &self,
        from: Identity,
        to: Identity,
    ) -> Result<(Arc<Connection>, Arc<Connection>), RelayError> {
        let connections = self.connections.read().await;
        let sender = connections
            .get(&from)
            .cloned()
            .ok_or(RelayError::UnknownSender(from))?;
        let recipient = connections
            .get(&to)
            .cloned()
            .ok_or(RelayError::UnknownRecipient(to))?;
        Ok((sender, recipient))
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Whether `identity` is registered.
    pub async fn contains(&self, identity: Identity) -> bool {
        self.connections.read().await.contains_key(&identity)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_count(count: usize) {
    metrics::gauge!(CONNECTIONS_ACTIVE).set(count as f64);
}
