//! Layered wire format.
//!
//! A relay only ever sees one layer:
//!
//! ```text
//! DDDD ‖ wrapped-key-b64 ‖ sealed-payload-b64
//! ```
//!
//! `DDDD` is the zero-padded decimal length of the wrapped-key segment, so
//! parsing never assumes a particular key size. Inside the sealed payload
//! sits `next-hop-address (10 digits) ‖ inner payload`; the inner payload
//! is the next layer at every hop except the exit, where it is the
//! delivered plaintext. A relay cannot see anything past its own layer.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::EnvelopeError;

/// Width of the hop address embedded in every decrypted layer.
pub const ADDRESS_DIGITS: usize = 10;

/// Width of the decimal length prefix in front of the wrapped-key segment.
const LEN_PREFIX_DIGITS: usize = 4;

/// A node's listening address: its port, zero-padded to ten digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HopAddress(String);

impl HopAddress {
    pub fn from_port(port: u32) -> Self {
        Self(format!("{port:010}"))
    }

    /// Parse and validate an address: exactly ten ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        if raw.len() != ADDRESS_DIGITS || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EnvelopeError::Address(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn port(&self) -> u64 {
        // Ten ASCII digits always parse as u64.
        self.0.parse().unwrap_or(0)
    }
}

impl fmt::Display for HopAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assemble one layer from its two encrypted segments.
pub fn encode_layer(wrapped_key: &[u8], sealed_payload: &[u8]) -> String {
    let wrapped_b64 = BASE64.encode(wrapped_key);
    let sealed_b64 = BASE64.encode(sealed_payload);
    let prefix = format!("{len:0width$}", len = wrapped_b64.len(), width = LEN_PREFIX_DIGITS);
    format!("{prefix}{wrapped_b64}{sealed_b64}")
}

/// Split one layer back into its raw encrypted segments.
///
/// Operates on bytes so hostile input can never hit a char-boundary
/// panic; both segments are base64, so anything else fails cleanly.
pub fn decode_layer(envelope: &str) -> Result<(Vec<u8>, Vec<u8>), EnvelopeError> {
    let bytes = envelope.as_bytes();
    if bytes.len() < LEN_PREFIX_DIGITS {
        return Err(EnvelopeError::Truncated);
    }
    let (prefix, rest) = bytes.split_at(LEN_PREFIX_DIGITS);
    if !prefix.iter().all(u8::is_ascii_digit) {
        return Err(EnvelopeError::LengthPrefix(
            String::from_utf8_lossy(prefix).into_owned(),
        ));
    }
    let wrapped_len = prefix
        .iter()
        .fold(0usize, |acc, b| acc * 10 + usize::from(b - b'0'));
    if rest.len() < wrapped_len {
        return Err(EnvelopeError::Truncated);
    }
    let (wrapped_b64, sealed_b64) = rest.split_at(wrapped_len);

    let wrapped = BASE64
        .decode(wrapped_b64)
        .map_err(|e| EnvelopeError::Encoding(e.to_string()))?;
    let sealed = BASE64
        .decode(sealed_b64)
        .map_err(|e| EnvelopeError::Encoding(e.to_string()))?;
    Ok((wrapped, sealed))
}

/// Concatenate the next-hop address and the inner payload into the
/// plaintext a layer seals.
pub fn join_inner(next_hop: &HopAddress, payload: &str) -> String {
    format!("{next_hop}{payload}")
}

/// Split a decrypted layer plaintext at the fixed address width.
pub fn split_inner(plaintext: &str) -> Result<(HopAddress, String), EnvelopeError> {
    let bytes = plaintext.as_bytes();
    if bytes.len() < ADDRESS_DIGITS {
        return Err(EnvelopeError::Truncated);
    }
    if !bytes[..ADDRESS_DIGITS].iter().all(u8::is_ascii_digit) {
        return Err(EnvelopeError::Address(
            String::from_utf8_lossy(&bytes[..ADDRESS_DIGITS]).into_owned(),
        ));
    }
    // All-digit prefix means this index is a char boundary.
    let address = HopAddress::parse(&plaintext[..ADDRESS_DIGITS])?;
    Ok((address, plaintext[ADDRESS_DIGITS..].to_string()))
}
