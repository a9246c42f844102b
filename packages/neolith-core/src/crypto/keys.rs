//! # Key Management
//!
//! This module handles the asymmetric keys used by the protocol.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SigningKeyPair (Ed25519)                   long-term, escrowed │   │
//! │  │  ─────────────────────────                                       │   │
//! │  │  • Signs every encrypted post and direct message               │   │
//! │  │  • Public half published through the server directory          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  AgreementKeyPair (X25519)                  long-term, escrowed │   │
//! │  │  ─────────────────────────                                       │   │
//! │  │  • Receives per-message ephemeral agreements                    │   │
//! │  │  • Public half published through the server directory          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EphemeralKeyPair (X25519)                  one envelope only   │   │
//! │  │  ─────────────────────────                                       │   │
//! │  │  • Generated fresh per (message, recipient)                     │   │
//! │  │  • Consumed by the single agreement it performs                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Agreement is symmetric: `a_secret × B_public == b_secret × A_public`.
//! Both the long-term and the ephemeral side reject non-contributory
//! results (low-order peer points), which would otherwise yield an
//! all-zero shared secret.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::crypto::encryption::SharedSecret;
use crate::error::{Error, Result};

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    /// Private signing key (secret)
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut OsRng);
        Self { secret }
    }

    /// Create from a raw 32-byte seed
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the secret seed bytes (for escrow)
    ///
    /// ## Security Warning
    ///
    /// Only use this to seal a key escrow. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// Long-term X25519 keypair for receiving encrypted envelopes
#[derive(ZeroizeOnDrop)]
pub struct AgreementKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl AgreementKeyPair {
    /// Generate a new random agreement keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw secret bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for escrow)
    ///
    /// ## Security Warning
    ///
    /// Only use this to seal a key escrow. Never log or transmit these bytes.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key agreement
    ///
    /// Returns a shared secret that both parties can compute:
    /// - Alice: alice_secret × bob_public
    /// - Bob: bob_secret × alice_public
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> Result<SharedSecret> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(Error::KeyExchangeFailed(
                "peer public key is a low-order point".into(),
            ));
        }
        Ok(SharedSecret::from_bytes(shared.to_bytes()))
    }
}

/// Single-use X25519 keypair for one envelope
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh ephemeral keypair
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes (sent in the envelope)
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Agree with a recipient's long-term key, consuming the secret
    pub fn diffie_hellman(self, their_public: &[u8; 32]) -> Result<SharedSecret> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(Error::KeyExchangeFailed(
                "recipient public key is a low-order point".into(),
            ));
        }
        Ok(SharedSecret::from_bytes(shared.to_bytes()))
    }
}

/// Public keys that can be safely shared with others
///
/// This is what the directory publishes for each member: the key-agreement
/// key to encrypt to, and the signing key to verify their posts against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKey {
    /// X25519 public key for key agreement (32 bytes)
    #[serde(rename = "x25519", with = "crate::encoding::b64_array")]
    pub agreement: [u8; 32],

    /// Ed25519 public key for signature verification (32 bytes)
    #[serde(rename = "ed25519", with = "crate::encoding::b64_array")]
    pub signing: [u8; 32],
}

impl PublicKey {
    /// Create a PublicKey from raw bytes
    pub fn from_bytes(agreement: [u8; 32], signing: [u8; 32]) -> Self {
        Self { agreement, signing }
    }

    /// Get the verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))
    }

    /// Short fingerprint for logs and key comparison in the UI
    ///
    /// First 8 bytes of SHA-256 over both keys, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.agreement);
        hasher.update(self.signing);
        hex::encode(&hasher.finalize()[..8])
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = AgreementKeyPair::generate();
        let kp2 = AgreementKeyPair::generate();
        assert_ne!(kp1.public_bytes(), kp2.public_bytes());

        let s1 = SigningKeyPair::generate();
        let s2 = SigningKeyPair::generate();
        assert_ne!(s1.public_bytes(), s2.public_bytes());
    }

    #[test]
    fn test_from_bytes_restores_public_key() {
        let original = AgreementKeyPair::generate();
        let restored = AgreementKeyPair::from_bytes(&original.secret_bytes());
        assert_eq!(original.public_bytes(), restored.public_bytes());

        let original = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_bytes(&original.secret_bytes());
        assert_eq!(original.public_bytes(), restored.public_bytes());
    }

    #[test]
    fn test_diffie_hellman_is_symmetric() {
        let alice = AgreementKeyPair::generate();
        let bob = AgreementKeyPair::generate();

        let alice_shared = alice.diffie_hellman(&bob.public_bytes()).unwrap();
        let bob_shared = bob.diffie_hellman(&alice.public_bytes()).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_ephemeral_agreement_matches_recipient() {
        let recipient = AgreementKeyPair::generate();
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_bytes();

        let sender_side = ephemeral.diffie_hellman(&recipient.public_bytes()).unwrap();
        let recipient_side = recipient.diffie_hellman(&ephemeral_public).unwrap();

        assert_eq!(sender_side.as_bytes(), recipient_side.as_bytes());
    }

    #[test]
    fn test_low_order_point_rejected() {
        let alice = AgreementKeyPair::generate();
        let result = alice.diffie_hellman(&[0u8; 32]);
        assert!(matches!(result, Err(Error::KeyExchangeFailed(_))));

        let ephemeral = EphemeralKeyPair::generate();
        let result = ephemeral.diffie_hellman(&[0u8; 32]);
        assert!(matches!(result, Err(Error::KeyExchangeFailed(_))));
    }

    #[test]
    fn test_public_key_serialization() {
        let agreement = AgreementKeyPair::generate();
        let signing = SigningKeyPair::generate();
        let public = PublicKey::from_bytes(agreement.public_bytes(), signing.public_bytes());

        let json = serde_json::to_value(public).unwrap();
        assert!(json["x25519"].is_string());
        assert!(json["ed25519"].is_string());

        let restored: PublicKey = serde_json::from_value(json).unwrap();
        assert_eq!(public, restored);
        assert!(restored.verifying_key().is_ok());
    }

    #[test]
    fn test_fingerprint_stable() {
        let public = PublicKey::from_bytes([1u8; 32], [2u8; 32]);
        assert_eq!(public.fingerprint(), public.fingerprint());
        assert_eq!(public.fingerprint().len(), 16);
        assert_ne!(
            public.fingerprint(),
            PublicKey::from_bytes([2u8; 32], [1u8; 32]).fingerprint()
        );
    }
}
