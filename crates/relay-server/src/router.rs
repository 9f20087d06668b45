//! Message routing between two registered parties.

use std::sync::Arc;
use std::time::Duration;

use relay_core::RelayError;
use relay_core::protocol::{InboundMessage, OutboundMessage};
use tracing::{Span, debug};

use crate::metrics::{MESSAGES_ROUTED_TOTAL, ROUTE_ERRORS_TOTAL};
use crate::registry::Registry;

/// Forwards inbound messages to their recipient.
///
/// The router never evicts: a failed delivery is reported to the caller and
/// the dead recipient is left to the heartbeat sweeper and its own session.
pub struct MessageRouter {
    registry: Arc<Registry>,
    write_timeout: Duration,
    span: Span,
}

impl MessageRouter {
    /// Create a router bounding each delivery by `write_timeout`.
    pub fn new(registry: Arc<Registry>, write_timeout: Duration, span: Span) -> Self {
        Self {
            registry,
            write_timeout,
            span,
        }
    }

    /// Deliver `message` to its recipient.
    pub async fn route(&self, message: &InboundMessage) -> Result<(), RelayError> {
        let result = self.deliver(message).await;
        match &result {
            Ok(()) => metrics::counter!(MESSAGES_ROUTED_TOTAL).increment(1),
            Err(err) => metrics::counter!(ROUTE_ERRORS_TOTAL, "code" => err.code()).increment(1),
        }
        result
    }

    async fn deliver(&self, message: &InboundMessage) -> Result<(), RelayError> {
        let (sender, recipient) = self
            .registry
            .resolve_pair(message.from_id, message.to_id)
            .await?;

        let outbound = OutboundMessage {
            from: sender.participant(),
            to: recipient.participant(),
            msg: message.msg.clone(),
        };
        let failed = |reason: String| RelayError::DeliveryFailed {
            recipient: message.to_id,
            reason,
        };
        let payload = serde_json::to_value(&outbound).map_err(|e| failed(e.to_string()))?;

        match tokio::time::timeout(self.write_timeout, recipient.transport().send_json(&payload))
            .await
        {
            Ok(Ok(())) => {
                debug!(parent: &self.span, from = %message.from_id, to = %message.to_id, "message delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed(format!(
                "write timed out after {:?}",
                self.write_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use crate::transport::memory::{MemoryPeer, MemoryTransport};
    use assert_matches::assert_matches;
    use relay_core::Identity;
    use serde_json::json;

    struct Fixture {
        registry: Arc<Registry>,
        router: MessageRouter,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(Registry::new(Span::none()));
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Duration::from_millis(50),
            Span::none(),
        );
        Fixture { registry, router }
    }

    async fn join(
        registry: &Registry,
        name: &str,
    ) -> (Identity, Arc<MemoryTransport>, MemoryPeer) {
        let id = Identity::generate();
        let (mem, peer) = MemoryTransport::pair();
        let transport: Arc<dyn Transport> = mem.clone();
        let _ = registry.add(id, name, transport).await.unwrap();
        (id, mem, peer)
    }

    fn message(from: Identity, to: Identity, msg: &str) -> InboundMessage {
        InboundMessage {
            from_id: from,
            to_id: to,
            msg: msg.into(),
        }
    }

    #[tokio::test]
    async fn delivers_with_current_names() {
        let f = fixture();
        let (alice, _, mut alice_peer) = join(&f.registry, "Alice").await;
        let (bob, _, mut bob_peer) = join(&f.registry, "Bob").await;

        f.router.route(&message(alice, bob, "hi")).await.unwrap();

        let frame = bob_peer.recv().await.unwrap().json().unwrap();
        assert_eq!(
            frame,
            json!({
                "from": {"id": alice, "name": "Alice"},
                "to": {"id": bob, "name": "Bob"},
                "msg": "hi",
            })
        );
        assert!(bob_peer.try_recv().is_none());
        assert!(alice_peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn unknown_recipient_writes_nothing() {
        let f = fixture();
        let (alice, _, mut alice_peer) = join(&f.registry, "Alice").await;
        let ghost = Identity::generate();

        let result = f.router.route(&message(alice, ghost, "hi")).await;

        assert_matches!(result, Err(RelayError::UnknownRecipient(id)) if id == ghost);
        assert!(alice_peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn unknown_sender_checked_first() {
        let f = fixture();
        let (bob, _, mut bob_peer) = join(&f.registry, "Bob").await;
        let ghost = Identity::generate();

        let result = f.router.route(&message(ghost, bob, "hi")).await;

        assert_matches!(result, Err(RelayError::UnknownSender(id)) if id == ghost);
        assert!(bob_peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn both_unknown_reports_sender() {
        let f = fixture();
        let result = f
            .router
            .route(&message(Identity::generate(), Identity::generate(), "hi"))
            .await;
        assert_matches!(result, Err(RelayError::UnknownSender(_)));
    }

    #[tokio::test]
    async fn write_failure_is_delivery_failed_without_eviction() {
        let f = fixture();
        let (alice, _, _alice_peer) = join(&f.registry, "Alice").await;
        let (bob, bob_mem, _bob_peer) = join(&f.registry, "Bob").await;
        bob_mem.fail_writes(true);

        let result = f.router.route(&message(alice, bob, "hi")).await;

        assert_matches!(result, Err(RelayError::DeliveryFailed { recipient, .. }) if recipient == bob);
        assert!(f.registry.contains(bob).await);
        assert!(!bob_mem.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_recipient_times_out() {
        let f = fixture();
        let (alice, _, _alice_peer) = join(&f.registry, "Alice").await;
        let (bob, bob_mem, _bob_peer) = join(&f.registry, "Bob").await;
        bob_mem.stall_writes(true);

        let result = f.router.route(&message(alice, bob, "hi")).await;

        assert_matches!(
            result,
            Err(RelayError::DeliveryFailed { reason, .. }) if reason.contains("timed out")
        );
    }

    #[tokio::test]
    async fn self_addressed_message_is_delivered() {
        let f = fixture();
        let (alice, _, mut alice_peer) = join(&f.registry, "Alice").await;

        f.router.route(&message(alice, alice, "note")).await.unwrap();

        let frame = alice_peer.recv().await.unwrap().json().unwrap();
        assert_eq!(frame["msg"], "note");
        assert_eq!(frame["from"]["name"], "Alice");
        assert_eq!(frame["to"]["name"], "Alice");
    }
}
