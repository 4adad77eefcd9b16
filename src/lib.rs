//! A minimal onion-routing overlay.
//!
//! A directory of relays, clients that build 3-hop layered-encryption
//! envelopes, and relays that peel one hybrid layer per hop and forward
//! the remainder. Each layer wraps a single-use symmetric session key
//! under one relay's public key; the relay unwraps it, opens the sealed
//! payload, reads the fixed-width next-hop address and passes the rest
//! along untouched. The exit relay removes the last layer, so the
//! destination client receives plaintext.
//!
//! Cross-node delivery goes through the [`channel::MessageChannel`]
//! abstraction; the bundled [`channel::InMemoryNetwork`] wires a whole
//! overlay into one process for tests and the demo binary.

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod relay;

#[cfg(test)]
mod overlay_tests;

pub use channel::{InMemoryNetwork, MessageChannel, MessageSink};
pub use client::{build_envelope, select_circuit, Circuit, Client, SendReceipt};
pub use config::{ForwardPolicy, OverlayConfig, PortScheme, CIRCUIT_HOPS};
pub use directory::{Directory, RelayIdentity};
pub use envelope::HopAddress;
pub use error::OverlayError;
pub use relay::{HopReport, Relay, RelayState};
