//! Error taxonomy for the overlay.
//!
//! Errors stay local to the hop that detects them: a relay reports failure
//! to its immediate caller and never back through the circuit to the
//! original sender.

use std::time::Duration;

use thiserror::Error;

/// Failures inside the crypto engine.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed key material: {0}")]
    KeyFormat(String),

    #[error("AEAD encryption failed")]
    Aead,

    /// Wrong key, wrong recipient, or tampered ciphertext. The AEAD tag
    /// makes these indistinguishable on purpose.
    #[error("decryption failed")]
    Decryption,
}

/// Failures while parsing the layered wire format.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope truncated")]
    Truncated,

    #[error("invalid length prefix: {0:?}")]
    LengthPrefix(String),

    #[error("invalid base64 segment: {0}")]
    Encoding(String),

    #[error("invalid hop address: {0:?}")]
    Address(String),

    #[error("layer plaintext is not valid UTF-8")]
    NotText,
}

/// Failures registering a relay with the directory.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("relay {0} is already registered")]
    AlreadyRegistered(u32),

    #[error("registration rejected: {0}")]
    MalformedKey(#[from] CryptoError),
}

/// Failures delivering a message to the next hop.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no route to {0}")]
    Unreachable(String),

    #[error("forward attempt exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// The next hop received the message and refused it. Not retried:
    /// a hop that rejected once will reject again.
    #[error("next hop rejected the message: {0}")]
    Rejected(String),
}

/// Top-level error surface of the overlay nodes.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("invalid request: {0}")]
    Validation(String),

    /// Fatal at relay startup; a relay that hits this never reports live.
    #[error("key initialization failed: {0}")]
    KeyInitialization(#[source] CryptoError),

    /// The message is dropped at this hop, reported to the immediate
    /// caller, and never retried.
    #[error("decryption failed at this hop: {0}")]
    Decryption(#[source] CryptoError),

    /// Crypto failure outside the decrypt path, e.g. while sealing a
    /// layer during envelope construction.
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[source] CryptoError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The next hop stayed unreachable through every allowed attempt.
    #[error("forwarding failed after {attempts} attempt(s): {source}")]
    Forwarding {
        attempts: u32,
        #[source]
        source: ForwardError,
    },

    #[error("circuit needs {needed} relays, directory has {available}")]
    InsufficientRelays { needed: usize, available: usize },
}
