//! Relay node: peel one layer, forward the remainder.
//!
//! Lifecycle: `Unregistered → Registering → Ready`. A relay that fails key
//! setup or registration never reaches `Ready` and never reports live.
//!
//! Per message: `Received → Decrypting → Forwarding → Done | Failed`.
//! Decryption failures drop the message at this hop, are reported to the
//! immediate caller only, and are never retried. Forwarding runs under a
//! per-attempt deadline with bounded retry and is surfaced as a typed
//! error instead of being silently discarded.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::channel::{MessageChannel, MessageSink};
use crate::config::{ForwardPolicy, OverlayConfig};
use crate::crypto::{self, Keypair};
use crate::directory::Directory;
use crate::envelope::{self, HopAddress};
use crate::error::{ForwardError, OverlayError};

/// Relay lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Unregistered,
    Registering,
    Ready,
}

/// Per-request result of one hop, returned to the caller so nothing has
/// to read the shared telemetry cell.
#[derive(Debug, Clone)]
pub struct HopReport {
    pub next_hop: HopAddress,
    pub forwarded: String,
    pub attempts: u32,
}

/// Best-effort last-seen values for inspection endpoints.
///
/// Overwritten by whichever concurrent message finishes a step last;
/// never a correlation key and never input to the protocol logic.
#[derive(Debug, Default, Clone)]
struct Telemetry {
    last_received_ciphertext: Option<String>,
    last_decrypted_plaintext: Option<String>,
    last_forward_address: Option<HopAddress>,
}

pub struct Relay {
    id: u32,
    keypair: Keypair,
    address: HopAddress,
    channel: Arc<dyn MessageChannel>,
    policy: ForwardPolicy,
    state: RelayState,
    telemetry: Mutex<Telemetry>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Bring a relay up with a freshly generated keypair and register it.
    /// Registration failure is fatal: the relay never reaches `Ready`.
    pub fn bootstrap(
        id: u32,
        config: &OverlayConfig,
        directory: &Directory,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, OverlayError> {
        Self::bring_up(id, Keypair::generate(), config, directory, channel)
    }

    /// Bring a relay up from an exported private key. A malformed key is
    /// fatal before registration is even attempted.
    pub fn bootstrap_with_key(
        id: u32,
        private_key_b64: &str,
        config: &OverlayConfig,
        directory: &Directory,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, OverlayError> {
        let keypair =
            Keypair::from_private_b64(private_key_b64).map_err(OverlayError::KeyInitialization)?;
        Self::bring_up(id, keypair, config, directory, channel)
    }

    fn bring_up(
        id: u32,
        keypair: Keypair,
        config: &OverlayConfig,
        directory: &Directory,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, OverlayError> {
        let mut relay = Self {
            id,
            keypair,
            address: HopAddress::from_port(config.ports.relay_port(id)),
            channel,
            policy: config.forward.clone(),
            state: RelayState::Unregistered,
            telemetry: Mutex::new(Telemetry::default()),
        };

        relay.state = RelayState::Registering;
        directory.register(id, &relay.keypair.export_public())?;
        relay.state = RelayState::Ready;
        info!(relay = id, address = %relay.address, "relay ready");
        Ok(relay)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> &HopAddress {
        &self.address
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Liveness probe; only a `Ready` relay ever answers.
    pub fn status(&self) -> &'static str {
        "live"
    }

    pub fn export_public_key(&self) -> String {
        self.keypair.export_public()
    }

    /// Inspection only. A production deployment must never expose this
    /// over the network.
    pub fn export_private_key(&self) -> String {
        self.keypair.export_private()
    }

    /// Decrypt one layer without forwarding: unwrap the session key with
    /// our private key, open the sealed payload, split off the next-hop
    /// address.
    pub fn peel(&self, message: &str) -> Result<(HopAddress, String), OverlayError> {
        let (wrapped, sealed) = envelope::decode_layer(message)?;
        let session_key =
            crypto::unwrap_key(&wrapped, self.keypair.secret()).map_err(OverlayError::Decryption)?;
        let plaintext = crypto::open(&sealed, &session_key).map_err(OverlayError::Decryption)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| OverlayError::Envelope(crate::error::EnvelopeError::NotText))?;
        Ok(envelope::split_inner(&plaintext)?)
    }

    /// Full per-message path: peel, record telemetry, forward the
    /// remainder unmodified to the next hop.
    pub async fn handle_message(&self, message: &str) -> Result<HopReport, OverlayError> {
        debug!(relay = self.id, "message received");
        self.telemetry.lock().last_received_ciphertext = Some(message.to_string());

        let (next_hop, remainder) = match self.peel(message) {
            Ok(peeled) => peeled,
            Err(err) => {
                warn!(relay = self.id, %err, "message dropped");
                return Err(err);
            }
        };

        {
            let mut t = self.telemetry.lock();
            t.last_decrypted_plaintext =
                Some(envelope::join_inner(&next_hop, &remainder));
            t.last_forward_address = Some(next_hop.clone());
        }
        debug!(relay = self.id, next_hop = %next_hop, "layer peeled, forwarding");

        match self.forward_with_retry(&next_hop, &remainder).await {
            Ok(attempts) => {
                debug!(relay = self.id, attempts, "forward done");
                Ok(HopReport {
                    next_hop,
                    forwarded: remainder,
                    attempts,
                })
            }
            Err((attempts, source)) => {
                warn!(relay = self.id, attempts, %source, "forward failed");
                Err(OverlayError::Forwarding { attempts, source })
            }
        }
    }

    /// Bounded retry with linear backoff. Unreachable hops and expired
    /// deadlines are transient and retried; an outright rejection by the
    /// next hop is final.
    async fn forward_with_retry(
        &self,
        to: &HopAddress,
        message: &str,
    ) -> Result<u32, (u32, ForwardError)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = timeout(
                self.policy.attempt_deadline,
                self.channel.send(to, message.to_string()),
            )
            .await;

            let err = match outcome {
                Ok(Ok(())) => return Ok(attempt),
                Ok(Err(err @ ForwardError::Rejected(_))) => return Err((attempt, err)),
                Ok(Err(err)) => err,
                Err(_elapsed) => ForwardError::DeadlineExceeded(self.policy.attempt_deadline),
            };

            if attempt >= self.policy.attempts {
                return Err((attempt, err));
            }
            debug!(relay = self.id, attempt, %err, "forward attempt failed, retrying");
            sleep(self.policy.backoff_before(attempt)).await;
        }
    }

    // Inspection endpoints: best-effort, last-writer-wins.

    pub fn last_received_ciphertext(&self) -> Option<String> {
        self.telemetry.lock().last_received_ciphertext.clone()
    }

    pub fn last_decrypted_plaintext(&self) -> Option<String> {
        self.telemetry.lock().last_decrypted_plaintext.clone()
    }

    pub fn last_forward_address(&self) -> Option<HopAddress> {
        self.telemetry.lock().last_forward_address.clone()
    }
}

#[async_trait]
impl MessageSink for Relay {
    async fn deliver(&self, message: String) -> Result<(), OverlayError> {
        self.handle_message(&message).await.map(|_| ())
    }
}
