//! Abstract forwarding channel between overlay nodes.
//!
//! The real deployment would put an HTTP hop here; the overlay itself only
//! needs "deliver this text message to that address". Nodes implement
//! [`MessageSink`] to receive; anything that can route implements
//! [`MessageChannel`]. The in-memory network wires both together for the
//! tests and the demo binary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::envelope::HopAddress;
use crate::error::{ForwardError, OverlayError};

/// Sending half: route one message to a listening address.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, to: &HopAddress, message: String) -> Result<(), ForwardError>;
}

/// Receiving half: a node's message endpoint.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: String) -> Result<(), OverlayError>;
}

/// Single-process network: a route table from address to sink.
///
/// Delivery awaits the receiving node's handler, so a chain of hops runs
/// as nested awaits; callers bound each hop with their own deadline.
#[derive(Default)]
pub struct InMemoryNetwork {
    routes: RwLock<HashMap<HopAddress, Arc<dyn MessageSink>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a sink at an address, replacing any previous binding.
    pub fn bind(&self, address: HopAddress, sink: Arc<dyn MessageSink>) {
        self.routes.write().insert(address, sink);
    }

    /// Detach an address. Sends to it fail as unreachable afterwards.
    pub fn unbind(&self, address: &HopAddress) {
        self.routes.write().remove(address);
    }
}

#[async_trait]
impl MessageChannel for InMemoryNetwork {
    async fn send(&self, to: &HopAddress, message: String) -> Result<(), ForwardError> {
        // Clone the sink out so the route table lock is not held across
        // the delivery await.
        let sink = self.routes.read().get(to).cloned();
        match sink {
            None => Err(ForwardError::Unreachable(to.to_string())),
            Some(sink) => sink
                .deliver(message)
                .await
                .map_err(|e| ForwardError::Rejected(e.to_string())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct CollectingSink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageSink for CollectingSink {
        async fn deliver(&self, message: String) -> Result<(), OverlayError> {
            self.seen.lock().push(message);
            Ok(())
        }
    }

    struct RefusingSink;

    #[async_trait]
    impl MessageSink for RefusingSink {
        async fn deliver(&self, _message: String) -> Result<(), OverlayError> {
            Err(OverlayError::Validation("message field missing".into()))
        }
    }

    #[tokio::test]
    async fn routes_message_to_bound_sink() {
        let network = InMemoryNetwork::new();
        let sink = Arc::new(CollectingSink { seen: Mutex::new(Vec::new()) });
        let addr = HopAddress::from_port(4000);
        network.bind(addr.clone(), sink.clone());

        network.send(&addr, "hello".into()).await.unwrap();
        assert_eq!(*sink.seen.lock(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn unbound_address_is_unreachable() {
        let network = InMemoryNetwork::new();
        let err = network
            .send(&HopAddress::from_port(4999), "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Unreachable(_)));
    }

    #[tokio::test]
    async fn sink_error_surfaces_as_rejection() {
        let network = InMemoryNetwork::new();
        let addr = HopAddress::from_port(4001);
        network.bind(addr.clone(), Arc::new(RefusingSink));

        let err = network.send(&addr, "x".into()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Rejected(_)));
    }

    #[tokio::test]
    async fn unbind_removes_the_route() {
        let network = InMemoryNetwork::new();
        let addr = HopAddress::from_port(4002);
        network.bind(
            addr.clone(),
            Arc::new(CollectingSink { seen: Mutex::new(Vec::new()) }),
        );
        network.unbind(&addr);

        let err = network.send(&addr, "x".into()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Unreachable(_)));
    }
}
