//! # AEAD Codec
//!
//! AES-256-GCM with 96-bit nonces and 128-bit tags.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       AES-256-GCM SEALED BOX                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  nonce (12 bytes)  │  ciphertext (len(plaintext))  │  tag (16 bytes)    │
//! │                                                                         │
//! │  • The nonce travels next to the ciphertext, never inside it           │
//! │  • The tag is appended to the ciphertext by aes-gcm                    │
//! │  • AAD is authenticated but not transmitted                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A tag failure is always `Error::DecryptionFailed`. There is no way to get
//! partially decrypted bytes out of this module.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::crypto::kdf;
use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce for AES-GCM encryption
///
/// ## Critical Security Requirement
///
/// **NEVER reuse a nonce with the same key!**
///
/// Envelope keys are derived per nonce, and channel keys are shared by
/// every member, so nonces are always drawn from the OS RNG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(#[serde(with = "crate::encoding::b64_array")] pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A shared secret produced by X25519 key agreement
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Create from raw DH output
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Derive the AEAD key for one envelope
    pub fn derive_message_key(
        &self,
        ephemeral_public: &[u8; 32],
        nonce: &Nonce,
    ) -> Result<EncryptionKey> {
        kdf::derive_message_key(&self.bytes, ephemeral_public, nonce)
    }
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| Error::InvalidKey(format!("Invalid AES key: {}", e)))
    }
}

/// Encrypt with a fresh random nonce
///
/// ## Returns
///
/// Tuple of (nonce, ciphertext_with_tag)
///
/// ## Example
///
/// ```ignore
/// let key = EncryptionKey::from_bytes([0u8; 32]);
/// let (nonce, ciphertext) = encrypt(&key, b"Hello, Bob!", b"#general")?;
/// ```
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let ciphertext = encrypt_with_nonce(key, &nonce, plaintext, aad)?;
    Ok((nonce, ciphertext))
}

/// Encrypt under a nonce chosen by the caller
///
/// Used when the key itself is derived from the nonce, so the nonce has to
/// exist before the key does. The caller is responsible for freshness.
pub fn encrypt_with_nonce(
    key: &EncryptionKey,
    nonce: &Nonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let payload = Payload {
        msg: plaintext,
        aad,
    };

    key.cipher()?
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))
}

/// Decrypt and authenticate
///
/// ## Errors
///
/// Returns `DecryptionFailed` if:
/// - The ciphertext or tag was modified
/// - The AAD doesn't match
/// - The key or nonce is wrong
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::DecryptionFailed(format!(
            "Ciphertext shorter than the {}-byte tag",
            TAG_SIZE
        )));
    }

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    key.cipher()?
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| {
            Error::DecryptionFailed("Decryption failed: authentication tag mismatch".into())
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let plaintext = b"Hello, World!";
        let aad = b"#general";

        let (nonce, ciphertext) = encrypt(&key, plaintext, aad).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = decrypt(&key, &nonce, &ciphertext, aad).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = EncryptionKey::from_bytes([1u8; 32]);
        let key2 = EncryptionKey::from_bytes([2u8; 32]);

        let (nonce, ciphertext) = encrypt(&key1, b"Secret message", b"").unwrap();
        let result = decrypt(&key2, &nonce, &ciphertext, b"");

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (nonce, ciphertext) = encrypt(&key, b"Secret", b"#rust").unwrap();
        let result = decrypt(&key, &nonce, &ciphertext, b"#go");

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (nonce, mut ciphertext) = encrypt(&key, b"Secret message", b"").unwrap();
        ciphertext[0] ^= 0x01;

        assert!(matches!(
            decrypt(&key, &nonce, &ciphertext, b""),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let nonce = Nonce::random();

        assert!(matches!(
            decrypt(&key, &nonce, &[0u8; 4], b""),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = EncryptionKey::from_bytes([42u8; 32]);

        let (n1, c1) = encrypt(&key, b"same", b"").unwrap();
        let (n2, c2) = encrypt(&key, b"same", b"").unwrap();

        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_nonce_serializes_as_base64() {
        let nonce = Nonce::from_bytes([0u8; NONCE_SIZE]);
        let json = serde_json::to_string(&nonce).unwrap();
        assert_eq!(json, "\"AAAAAAAAAAAAAAAA\"");

        let restored: Nonce = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, nonce);
    }
}
