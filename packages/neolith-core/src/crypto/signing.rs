//! # Signature Codec
//!
//! Detached Ed25519 signatures over raw message bytes.
//!
//! Envelopes are signed over the *plaintext*, not the ciphertext. A
//! recipient therefore authenticates authorship only after the AEAD layer
//! has accepted the ciphertext, and a shared channel key cannot be used to
//! forge a post from another member.

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 digital signature, base64 on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(#[serde(with = "crate::encoding::b64_array")] pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 64 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; SIGNATURE_SIZE] = slice.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sign a message using Ed25519
///
/// Ed25519 signatures are deterministic: signing the same message with the
/// same key always produces the same signature.
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature against a raw 32-byte public key
///
/// ## Returns
///
/// `Ok(())` if valid, `Err(VerificationFailed)` if invalid, `Err(InvalidKey)`
/// if the public key is not a valid curve point.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("Invalid public key: {}", e)))?;
    verify_with_key(&verifying_key, message, signature)
}

/// Verify a signature using a VerifyingKey directly
pub fn verify_with_key(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> Result<()> {
    let sig = Ed25519Signature::from_bytes(&signature.0);
    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| Error::VerificationFailed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = SigningKeyPair::generate();
        let message = b"Hello, channel!";

        let signature = sign(&keypair, message);
        assert!(verify(&keypair.public_bytes(), message, &signature).is_ok());
        assert!(verify_with_key(&keypair.verifying_key(), message, &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = SigningKeyPair::generate();
        let signature = sign(&keypair, b"original");

        assert!(matches!(
            verify(&keypair.public_bytes(), b"modified", &signature),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn test_wrong_signer_fails() {
        let alice = SigningKeyPair::generate();
        let mallory = SigningKeyPair::generate();
        let signature = sign(&mallory, b"I am Alice");

        assert!(matches!(
            verify(&alice.public_bytes(), b"I am Alice", &signature),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn test_deterministic() {
        let keypair = SigningKeyPair::generate();
        assert_eq!(sign(&keypair, b"same"), sign(&keypair, b"same"));
    }

    #[test]
    fn test_signature_from_slice() {
        let keypair = SigningKeyPair::generate();
        let signature = sign(&keypair, b"msg");

        let restored = Signature::from_slice(signature.as_ref()).unwrap();
        assert_eq!(signature, restored);
        assert!(Signature::from_slice(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_signature_serialization() {
        let keypair = SigningKeyPair::generate();
        let signature = sign(&keypair, b"msg");

        let json = serde_json::to_string(&signature).unwrap();
        let restored: Signature = serde_json::from_str(&json).unwrap();

        assert_eq!(signature, restored);
        assert_eq!(
            crate::encoding::decode(json.trim_matches('"')).unwrap(),
            signature.as_bytes().to_vec()
        );
    }
}
