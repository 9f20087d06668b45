//! The relay core as seen by the web layer.
//!
//! [`Relay`] wires the registry, handshake, router, and session loop
//! together, each under its own span. The web layer calls
//! [`open_session`](Relay::open_session) on a freshly upgraded transport and
//! then [`run_session`](Relay::run_session) until the connection ends.

use std::sync::Arc;

use relay_core::{Identity, RelayError};
use tokio_util::sync::CancellationToken;
use tracing::info_span;

use crate::config::RelayConfig;
use crate::handshake::Handshake;
use crate::heartbeat::HeartbeatSweeper;
use crate::registry::Registry;
use crate::router::MessageRouter;
use crate::session::{Session, SessionEnd, SessionPolicy};
use crate::transport::Transport;

/// Registry plus the protocol components operating on it.
pub struct Relay {
    config: RelayConfig,
    registry: Arc<Registry>,
    handshake: Handshake,
    router: Arc<MessageRouter>,
    session: Session,
}

impl Relay {
    /// Build a relay with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(
            Registry::new(info_span!("registry")).with_close_timeout(config.write_timeout),
        );
        let handshake = Handshake::new(
            Arc::clone(&registry),
            config.handshake_timeout,
            info_span!("handshake"),
        );
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            config.write_timeout,
            info_span!("router"),
        ));
        let session = Session::new(
            Arc::clone(&registry),
            Arc::clone(&router),
            SessionPolicy {
                max_consecutive_read_errors: config.max_consecutive_read_errors,
                enforce_sender_identity: config.enforce_sender_identity,
                notify_route_errors: config.notify_route_errors,
                write_timeout: config.write_timeout,
            },
            info_span!("session"),
        );
        Self {
            config,
            registry,
            handshake,
            router,
            session,
        }
    }

    /// Handshake `transport` and register it.
    pub async fn open_session(&self, transport: Arc<dyn Transport>) -> Result<Identity, RelayError> {
        self.handshake
            .open(transport, &CancellationToken::new())
            .await
    }

    /// Like [`open_session`](Self::open_session), abandoning the identity
    /// wait when `cancel` fires.
    pub async fn open_session_with_cancel(
        &self,
        transport: Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Result<Identity, RelayError> {
        self.handshake.open(transport, cancel).await
    }

    /// Serve a registered connection until it ends.
    pub async fn run_session(
        &self,
        cancel: &CancellationToken,
        identity: Identity,
        transport: &Arc<dyn Transport>,
    ) -> SessionEnd {
        self.session.run(cancel, identity, transport).await
    }

    /// A heartbeat sweeper over this relay's registry.
    pub fn sweeper(&self) -> HeartbeatSweeper {
        HeartbeatSweeper::new(
            Arc::clone(&self.registry),
            self.config.heartbeat_interval,
            self.config.write_timeout,
            info_span!("heartbeat"),
        )
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The message router.
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Active configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{Frame, MemoryPeer, MemoryTransport};
    use assert_matches::assert_matches;
    use serde_json::json;

    async fn connect(relay: &Relay, id: Identity, name: &str) -> (Arc<dyn Transport>, MemoryPeer) {
        let (mem, mut peer) = MemoryTransport::pair();
        let transport: Arc<dyn Transport> = mem;
        peer.send_json(&json!({"id": id, "name": name}));
        let opened = relay.open_session(Arc::clone(&transport)).await.unwrap();
        assert_eq!(opened, id);
        assert_eq!(peer.recv().await, Some(Frame::Text("HELLO".into())));
        assert_eq!(peer.recv().await, Some(Frame::Text(format!("WELCOME {name}"))));
        (transport, peer)
    }

    // HELLO, WELCOME, a rejected duplicate, an unknown recipient, and the
    // session carrying on afterwards.
    #[tokio::test]
    async fn alice_scenario() {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        let alice = Identity::generate();
        let (alice_transport, mut alice_peer) = connect(&relay, alice, "Alice").await;

        let (dup_mem, mut dup_peer) = MemoryTransport::pair();
        dup_peer.send_json(&json!({"id": alice, "name": "Alice"}));
        assert_matches!(
            relay.open_session(dup_mem.clone()).await,
            Err(RelayError::IdentityConflict(id)) if id == alice
        );
        assert_eq!(dup_peer.recv().await, Some(Frame::Text("HELLO".into())));
        assert_eq!(
            dup_peer.recv().await,
            Some(Frame::Text("Already connected".into()))
        );
        assert!(dup_mem.is_closed());

        let cancel = CancellationToken::new();
        let session = {
            let relay = Arc::clone(&relay);
            let cancel = cancel.clone();
            tokio::spawn(async move { relay.run_session(&cancel, alice, &alice_transport).await })
        };

        let bob = Identity::generate();
        alice_peer.send_json(&json!({"fromID": alice, "toID": bob, "msg": "hi"}));
        let notice = alice_peer.recv().await.unwrap().json().unwrap();
        assert_eq!(notice["error"]["code"], "UNKNOWN_RECIPIENT");
        assert!(relay.registry().contains(alice).await);

        let (bob_transport, mut bob_peer) = connect(&relay, bob, "Bob").await;
        alice_peer.send_json(&json!({"fromID": alice, "toID": bob, "msg": "hi again"}));
        let frame = bob_peer.recv().await.unwrap().json().unwrap();
        assert_eq!(frame["from"]["name"], "Alice");
        assert_eq!(frame["msg"], "hi again");

        cancel.cancel();
        assert_eq!(session.await.unwrap(), SessionEnd::Cancelled);
        assert!(!relay.registry().contains(alice).await);
        assert!(relay.registry().contains(bob).await);
        drop(bob_transport);
    }

    #[tokio::test]
    async fn sweeper_shares_registry() {
        let relay = Relay::new(RelayConfig::default());
        let (_transport, _peer) = connect(&relay, Identity::generate(), "A").await;
        let report = relay.sweeper().sweep_once().await;
        assert_eq!(report.probed, 1);
        assert_eq!(report.evicted, 0);
    }
}
