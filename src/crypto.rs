//! Hybrid crypto engine for the overlay.
//!
//! Two primitives, nothing else:
//!
//! - **Key wrap** (asymmetric): an X25519 exchange against the recipient's
//!   public key, HKDF-SHA256 to a wrapping key, AES-256-GCM over the
//!   session key. Strictly a key-wrapping construction for 32-byte
//!   session keys, never bulk data.
//! - **Payload seal** (symmetric): AES-256-GCM with a fresh random nonce
//!   per call, nonce prepended to the ciphertext.
//!
//! Every exported form is base64 so it can travel inside text messages.
//! The wrap blob has a constant length ([`WRAPPED_KEY_LEN`]) for a given
//! scheme; callers still parse layer boundaries from the length prefix in
//! the wire format rather than assuming that constant.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::CryptoError;

/// Raw length of every key this engine handles.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length; the first `NONCE_LEN` bytes of every sealed
/// payload are the nonce.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Length of a wrap blob: ephemeral public key, nonce, then the sealed
/// 32-byte session key with its tag. Constant for this scheme.
pub const WRAPPED_KEY_LEN: usize = KEY_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;

/// Domain separator bound into the HKDF info for key wrapping.
const WRAP_INFO: &[u8] = b"onion-overlay key wrap v1";

/// Long-lived X25519 keypair owned by a relay.
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a keypair from an exported private key.
    pub fn from_private_b64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = decode_fixed(encoded)?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn export_public(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Exports the private half. Test and inspection use only.
    pub fn export_private(&self) -> String {
        BASE64.encode(self.secret.to_bytes())
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// Import an exported public key, validating format and length.
pub fn import_public(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes: [u8; KEY_LEN] = decode_fixed(encoded)?;
    Ok(PublicKey::from(bytes))
}

/// Single-use symmetric session key, one per circuit hop per message.
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn export(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn import(encoded: &str) -> Result<Self, CryptoError> {
        Ok(Self(decode_fixed(encoded)?))
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Wrap a session key for a recipient. Output is
/// `ephemeral_pub(32) ‖ nonce(12) ‖ ct(48)`, always [`WRAPPED_KEY_LEN`]
/// bytes.
pub fn wrap_key(session: &SessionKey, recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::Aead);
    }

    let wrapping = derive_wrapping_key(shared.as_bytes(), &ephemeral_pub, recipient);
    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(wrapping));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), session.as_bytes().as_slice())
        .map_err(|_| CryptoError::Aead)?;

    let mut blob = Vec::with_capacity(WRAPPED_KEY_LEN);
    blob.extend_from_slice(ephemeral_pub.as_bytes());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ct);
    Ok(blob)
}

/// Unwrap a session key with the recipient's private key. Fails on wrong
/// recipient or any corruption of the blob.
pub fn unwrap_key(blob: &[u8], secret: &StaticSecret) -> Result<SessionKey, CryptoError> {
    if blob.len() != WRAPPED_KEY_LEN {
        return Err(CryptoError::Decryption);
    }
    let mut ephemeral_bytes = [0u8; KEY_LEN];
    ephemeral_bytes.copy_from_slice(&blob[..KEY_LEN]);
    let ephemeral_pub = PublicKey::from(ephemeral_bytes);

    let shared = secret.diffie_hellman(&ephemeral_pub);
    if !shared.was_contributory() {
        return Err(CryptoError::Decryption);
    }

    let recipient_pub = PublicKey::from(secret);
    let wrapping = derive_wrapping_key(shared.as_bytes(), &ephemeral_pub, &recipient_pub);
    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(wrapping));
    let nonce = &blob[KEY_LEN..KEY_LEN + NONCE_LEN];
    let ct = &blob[KEY_LEN + NONCE_LEN..];
    let key_bytes = cipher
        .decrypt(Nonce::from_slice(nonce), ct)
        .map_err(|_| CryptoError::Decryption)?;

    let bytes: [u8; KEY_LEN] = key_bytes
        .try_into()
        .map_err(|_| CryptoError::Decryption)?;
    Ok(SessionKey(bytes))
}

/// Seal a payload under a session key. Output is `nonce(12) ‖ ct`.
pub fn seal(plaintext: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(*key.as_bytes()));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Aead)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Open a nonce-prefixed sealed payload. Any bit flip in nonce or
/// ciphertext fails the tag check.
pub fn open(sealed: &[u8], key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decryption);
    }
    let (nonce, ct) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&Key::<Aes256Gcm>::from(*key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), ct)
        .map_err(|_| CryptoError::Decryption)
}

/// HKDF the raw shared secret into a wrapping key, binding both public
/// keys of the exchange.
fn derive_wrapping_key(
    shared: &[u8; KEY_LEN],
    ephemeral_pub: &PublicKey,
    recipient: &PublicKey,
) -> [u8; KEY_LEN] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut info = Vec::with_capacity(WRAP_INFO.len() + 2 * KEY_LEN);
    info.extend_from_slice(WRAP_INFO);
    info.extend_from_slice(ephemeral_pub.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut okm = [0u8; KEY_LEN];
    hk.expand(&info, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N], CryptoError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::KeyFormat(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::KeyFormat(format!("expected {N} bytes, got {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_export_import_round_trips() {
        let keypair = Keypair::generate();
        let exported = keypair.export_public();
        let imported = import_public(&exported).unwrap();
        assert_eq!(imported.as_bytes(), keypair.public().as_bytes());
    }

    #[test]
    fn private_key_export_import_round_trips() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_private_b64(&keypair.export_private()).unwrap();
        assert_eq!(restored.export_public(), keypair.export_public());
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(matches!(
            import_public("not!!base64"),
            Err(CryptoError::KeyFormat(_))
        ));
    }

    #[test]
    fn import_rejects_wrong_length() {
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(
            import_public(&short),
            Err(CryptoError::KeyFormat(_))
        ));
    }

    #[test]
    fn session_key_export_import_round_trips() {
        let key = SessionKey::generate();
        let restored = SessionKey::import(&key.export()).unwrap();
        assert_eq!(restored.as_bytes(), key.as_bytes());
    }

    #[test]
    fn wrap_blob_length_is_constant() {
        let recipient = Keypair::generate();
        for _ in 0..4 {
            let blob = wrap_key(&SessionKey::generate(), recipient.public()).unwrap();
            assert_eq!(blob.len(), WRAPPED_KEY_LEN);
        }
    }

    #[test]
    fn wrap_unwrap_round_trips() {
        let recipient = Keypair::generate();
        let session = SessionKey::generate();
        let blob = wrap_key(&session, recipient.public()).unwrap();
        let unwrapped = unwrap_key(&blob, recipient.secret()).unwrap();
        assert_eq!(unwrapped.as_bytes(), session.as_bytes());
    }

    #[test]
    fn unwrap_with_wrong_key_fails() {
        let recipient = Keypair::generate();
        let other = Keypair::generate();
        let blob = wrap_key(&SessionKey::generate(), recipient.public()).unwrap();
        assert!(matches!(
            unwrap_key(&blob, other.secret()),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn tampered_wrap_blob_fails() {
        let recipient = Keypair::generate();
        let mut blob = wrap_key(&SessionKey::generate(), recipient.public()).unwrap();
        // Flip one bit inside the sealed portion.
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            unwrap_key(&blob, recipient.secret()),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn seal_open_round_trips() {
        let key = SessionKey::generate();
        let sealed = seal(b"0000005001hello", &key).unwrap();
        assert_eq!(open(&sealed, &key).unwrap(), b"0000005001hello");
    }

    #[test]
    fn seal_uses_fresh_nonce_per_call() {
        let key = SessionKey::generate();
        let a = seal(b"same plaintext", &key).unwrap();
        let b = seal(b"same plaintext", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_rejects_any_bit_flip() {
        let key = SessionKey::generate();
        let sealed = seal(b"payload", &key).unwrap();
        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x80;
            assert!(
                matches!(open(&tampered, &key), Err(CryptoError::Decryption)),
                "bit flip at byte {i} must not decrypt"
            );
        }
    }

    #[test]
    fn open_rejects_wrong_key() {
        let sealed = seal(b"payload", &SessionKey::generate()).unwrap();
        assert!(matches!(
            open(&sealed, &SessionKey::generate()),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn open_rejects_truncated_input() {
        let key = SessionKey::generate();
        assert!(matches!(
            open(&[0u8; NONCE_LEN], &key),
            Err(CryptoError::Decryption)
        ));
    }
}
