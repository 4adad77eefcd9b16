//! Client node: picks circuits, builds nested envelopes, receives
//! delivered plaintext.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::index::sample;
use tracing::{debug, info, warn};

use crate::channel::{MessageChannel, MessageSink};
use crate::config::{OverlayConfig, PortScheme, CIRCUIT_HOPS};
use crate::crypto::{self, SessionKey};
use crate::directory::{Directory, RelayIdentity};
use crate::envelope::{self, HopAddress};
use crate::error::OverlayError;

/// An ordered path of exactly [`CIRCUIT_HOPS`] distinct relays, chosen
/// fresh for one message and never reused.
#[derive(Debug, Clone)]
pub struct Circuit {
    hops: Vec<RelayIdentity>,
}

impl Circuit {
    /// Build a circuit from an explicit hop sequence, enforcing the
    /// length and distinctness invariants.
    pub fn new(hops: Vec<RelayIdentity>) -> Result<Self, OverlayError> {
        if hops.len() != CIRCUIT_HOPS {
            return Err(OverlayError::Validation(format!(
                "circuit must have {CIRCUIT_HOPS} hops, got {}",
                hops.len()
            )));
        }
        for (i, hop) in hops.iter().enumerate() {
            if hops[..i].iter().any(|h| h.id == hop.id) {
                return Err(OverlayError::Validation(format!(
                    "circuit repeats relay {}",
                    hop.id
                )));
            }
        }
        Ok(Self { hops })
    }

    pub fn hops(&self) -> &[RelayIdentity] {
        &self.hops
    }

    pub fn entry(&self) -> &RelayIdentity {
        &self.hops[0]
    }

    pub fn relay_ids(&self) -> Vec<u32> {
        self.hops.iter().map(|h| h.id).collect()
    }
}

/// Draw a circuit uniformly at random without replacement from a
/// directory snapshot.
pub fn select_circuit(snapshot: &[RelayIdentity]) -> Result<Circuit, OverlayError> {
    if snapshot.len() < CIRCUIT_HOPS {
        return Err(OverlayError::InsufficientRelays {
            needed: CIRCUIT_HOPS,
            available: snapshot.len(),
        });
    }
    let picks = sample(&mut rand::thread_rng(), snapshot.len(), CIRCUIT_HOPS);
    let hops = picks.iter().map(|i| snapshot[i].clone()).collect();
    Circuit::new(hops)
}

/// Build the nested envelope for one message, innermost (exit) layer
/// first. Each layer gets a fresh single-use session key; the session key
/// travels wrapped under that relay's public key.
pub fn build_envelope(
    plaintext: &str,
    destination: &HopAddress,
    circuit: &Circuit,
    ports: &PortScheme,
) -> Result<String, OverlayError> {
    let mut next_hop = destination.clone();
    let mut payload = plaintext.to_string();

    for relay in circuit.hops().iter().rev() {
        let session = SessionKey::generate();
        let inner = envelope::join_inner(&next_hop, &payload);
        let sealed = crypto::seal(inner.as_bytes(), &session).map_err(OverlayError::Crypto)?;
        let recipient = crypto::import_public(&relay.public_key)
            .map_err(crate::error::RegistryError::MalformedKey)?;
        let wrapped = crypto::wrap_key(&session, &recipient).map_err(OverlayError::Crypto)?;

        payload = envelope::encode_layer(&wrapped, &sealed);
        next_hop = HopAddress::from_port(ports.relay_port(relay.id));
    }
    Ok(payload)
}

/// Success token for a send: the message was handed into the circuit.
/// It says nothing about end-to-end delivery; failures past the entry
/// hand-off stay with the hop that saw them.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub circuit: Vec<u32>,
}

#[derive(Debug, Default)]
struct ClientTelemetry {
    last_received: Option<String>,
    last_sent: Option<String>,
    last_circuit: Option<Vec<u32>>,
}

pub struct Client {
    id: u32,
    address: HopAddress,
    ports: PortScheme,
    directory: Arc<Directory>,
    channel: Arc<dyn MessageChannel>,
    telemetry: Mutex<ClientTelemetry>,
}

impl Client {
    pub fn new(
        id: u32,
        config: &OverlayConfig,
        directory: Arc<Directory>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self {
            id,
            address: HopAddress::from_port(config.ports.user_port(id)),
            ports: config.ports.clone(),
            directory,
            channel,
            telemetry: Mutex::new(ClientTelemetry::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> &HopAddress {
        &self.address
    }

    /// Liveness probe.
    pub fn status(&self) -> &'static str {
        "live"
    }

    /// Send a message to another client through a fresh 3-relay circuit.
    ///
    /// The receipt acknowledges hand-off into the circuit only. There is
    /// no end-to-end delivery confirmation in this overlay: a failure at
    /// any later hop is reported at that hop and never travels back here.
    pub async fn send(
        &self,
        message: &str,
        destination_id: u32,
    ) -> Result<SendReceipt, OverlayError> {
        let snapshot = self.directory.list();
        let circuit = select_circuit(&snapshot)?;
        let destination = HopAddress::from_port(self.ports.user_port(destination_id));
        let wire = build_envelope(message, &destination, &circuit, &self.ports)?;
        let entry = HopAddress::from_port(self.ports.relay_port(circuit.entry().id));

        {
            let mut t = self.telemetry.lock();
            t.last_sent = Some(message.to_string());
            t.last_circuit = Some(circuit.relay_ids());
        }
        info!(
            client = self.id,
            destination = destination_id,
            circuit = ?circuit.relay_ids(),
            "sending through circuit"
        );

        if let Err(err) = self.channel.send(&entry, wire).await {
            warn!(client = self.id, %err, "circuit swallowed the message");
        }
        Ok(SendReceipt {
            circuit: circuit.relay_ids(),
        })
    }

    // Inspection endpoints: best-effort, last-writer-wins.

    pub fn last_received_message(&self) -> Option<String> {
        self.telemetry.lock().last_received.clone()
    }

    pub fn last_sent_message(&self) -> Option<String> {
        self.telemetry.lock().last_sent.clone()
    }

    pub fn last_circuit(&self) -> Option<Vec<u32>> {
        self.telemetry.lock().last_circuit.clone()
    }
}

/// The client's receive endpoint is a terminal sink: the exit relay
/// already removed the last layer, so what arrives here is plaintext.
#[async_trait]
impl MessageSink for Client {
    async fn deliver(&self, message: String) -> Result<(), OverlayError> {
        debug!(client = self.id, "plaintext delivered");
        self.telemetry.lock().last_received = Some(message);
        Ok(())
    }
}
