//! # Identity Module
//!
//! Long-term identity keys and their password-wrapped server escrow.
//!
//! ## Key Escrow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           KEY ESCROW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Stored by the server, one per identity key:                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  key_spec   { algorithm, salt, iterations }                     │   │
//! │  │  nonce      12 bytes                                            │   │
//! │  │  data       AES-256-GCM(secret seed) + tag                      │   │
//! │  │  public_key 32 bytes (optional, checked after unwrap)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Unwrap:                                                               │
//! │                                                                         │
//! │  password ──► PBKDF2(key_spec) ──► AES key                             │
//! │                                        │                                │
//! │  data, nonce ──────────────────────────┴──► AES-GCM decrypt            │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                        32-byte secret seed             │
//! │                                                  │                      │
//! │                          ┌───────────────────────┴──────────┐          │
//! │                          ▼                                  ▼          │
//! │                  X25519 StaticSecret              Ed25519 SigningKey   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A wrong password and a corrupted escrow look the same: the tag does not
//! verify and `DecryptionFailed` is returned. No key material is produced
//! in that case.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt, encrypt, AgreementKeyPair, Nonce, PasswordKeyMaterial, PasswordSpec, PublicKey,
    SigningKeyPair,
};
use crate::error::{Error, Result};

/// Length of the random escrow salt
pub const ESCROW_SALT_SIZE: usize = 32;

/// A secret key encrypted under a password-derived key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEscrow {
    /// How to derive the AES-GCM key from the password
    pub key_spec: PasswordSpec,

    /// AES-GCM nonce
    pub nonce: Nonce,

    /// Encrypted secret seed with tag
    #[serde(rename = "data", with = "crate::encoding::b64")]
    pub ciphertext: Vec<u8>,

    /// Public half of the escrowed key
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::encoding::b64_array_opt"
    )]
    pub public_key: Option<[u8; 32]>,
}

impl KeyEscrow {
    /// Recover the 32-byte secret seed
    ///
    /// ## Errors
    ///
    /// - `DecryptionFailed`: wrong password or corrupted escrow
    /// - `InvalidKey`: the plaintext is not a 32-byte seed
    /// - `KeyDerivationFailed`: the key spec is unusable
    pub fn unwrap_secret(&self, material: &PasswordKeyMaterial) -> Result<Zeroizing<[u8; 32]>> {
        let key = self.key_spec.derive_escrow_key(material)?;
        let plaintext = Zeroizing::new(decrypt(&key, &self.nonce, &self.ciphertext, &[])?);

        let seed: [u8; 32] = plaintext.as_slice().try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "Escrowed secret must be 32 bytes, got {}",
                plaintext.len()
            ))
        })?;
        Ok(Zeroizing::new(seed))
    }

    /// Wrap a secret seed under a password
    ///
    /// Salt and nonce are fresh for every call.
    pub fn seal(
        secret: &[u8; 32],
        public_key: [u8; 32],
        material: &PasswordKeyMaterial,
        iterations: u32,
    ) -> Result<Self> {
        let mut salt = vec![0u8; ESCROW_SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let key_spec = PasswordSpec::pbkdf2_sha256(salt, iterations);
        let key = key_spec.derive_escrow_key(material)?;
        let (nonce, ciphertext) = encrypt(&key, secret, &[])?;

        Ok(Self {
            key_spec,
            nonce,
            ciphertext,
            public_key: Some(public_key),
        })
    }

    fn check_public_key(&self, derived: &[u8; 32], which: &str) -> Result<()> {
        match self.public_key {
            Some(expected) if &expected != derived => Err(Error::InvalidKey(format!(
                "Escrowed {} key does not match its published public key",
                which
            ))),
            _ => Ok(()),
        }
    }
}

/// The user's long-term key agreement and signing keys
pub struct IdentityKeyBundle {
    agreement: AgreementKeyPair,
    signing: SigningKeyPair,
}

impl IdentityKeyBundle {
    /// Generate a fresh identity (account signup)
    pub fn generate() -> Self {
        Self {
            agreement: AgreementKeyPair::generate(),
            signing: SigningKeyPair::generate(),
        }
    }

    /// Build from existing keypairs
    pub fn from_keypairs(agreement: AgreementKeyPair, signing: SigningKeyPair) -> Self {
        Self { agreement, signing }
    }

    /// Recover both identity keys from their escrows
    ///
    /// Unwraps exactly two escrows. Either failing fails the whole bundle.
    pub fn unwrap(
        x25519: &KeyEscrow,
        ed25519: &KeyEscrow,
        material: &PasswordKeyMaterial,
    ) -> Result<Self> {
        let agreement_seed = x25519.unwrap_secret(material)?;
        let agreement = AgreementKeyPair::from_bytes(&agreement_seed);
        x25519.check_public_key(&agreement.public_bytes(), "x25519")?;

        let signing_seed = ed25519.unwrap_secret(material)?;
        let signing = SigningKeyPair::from_bytes(&signing_seed);
        ed25519.check_public_key(&signing.public_bytes(), "ed25519")?;

        let bundle = Self { agreement, signing };
        tracing::debug!("Unwrapped identity keys {}", bundle.public_key().fingerprint());
        Ok(bundle)
    }

    /// Escrow both keys under a password
    ///
    /// Returns `(x25519, ed25519)`.
    pub fn seal(
        &self,
        material: &PasswordKeyMaterial,
        iterations: u32,
    ) -> Result<(KeyEscrow, KeyEscrow)> {
        let agreement_secret = Zeroizing::new(self.agreement.secret_bytes());
        let signing_secret = Zeroizing::new(self.signing.secret_bytes());

        let x25519 = KeyEscrow::seal(
            &agreement_secret,
            self.agreement.public_bytes(),
            material,
            iterations,
        )?;
        let ed25519 = KeyEscrow::seal(
            &signing_secret,
            self.signing.public_bytes(),
            material,
            iterations,
        )?;
        Ok((x25519, ed25519))
    }

    /// The key agreement keypair
    pub fn agreement(&self) -> &AgreementKeyPair {
        &self.agreement
    }

    /// The signing keypair
    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    /// Public keys to publish through the directory
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.agreement.public_bytes(), self.signing.public_bytes())
    }
}

impl fmt::Debug for IdentityKeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyBundle")
            .field("fingerprint", &self.public_key().fingerprint())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ITERATIONS: u32 = 1000;

    #[test]
    fn test_escrow_roundtrip() {
        let material = PasswordKeyMaterial::from_password("correct-password");
        let secret = [7u8; 32];

        let escrow = KeyEscrow::seal(&secret, [1u8; 32], &material, ITERATIONS).unwrap();
        let recovered = escrow.unwrap_secret(&material).unwrap();

        assert_eq!(*recovered, secret);
    }

    #[test]
    fn test_escrow_wrong_password() {
        let material = PasswordKeyMaterial::from_password("correct-password");
        let escrow = KeyEscrow::seal(&[7u8; 32], [1u8; 32], &material, ITERATIONS).unwrap();

        let wrong = PasswordKeyMaterial::from_password("wrong-password");
        let result = escrow.unwrap_secret(&wrong);

        assert!(matches!(result, Err(Error::DecryptionFailed(_))));
    }

    #[test]
    fn test_escrow_corrupted() {
        let material = PasswordKeyMaterial::from_password("correct-password");
        let mut escrow = KeyEscrow::seal(&[7u8; 32], [1u8; 32], &material, ITERATIONS).unwrap();
        escrow.ciphertext[3] ^= 0x80;

        assert!(matches!(
            escrow.unwrap_secret(&material),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_escrow_salt_and_nonce_fresh() {
        let material = PasswordKeyMaterial::from_password("pw");
        let a = KeyEscrow::seal(&[7u8; 32], [1u8; 32], &material, ITERATIONS).unwrap();
        let b = KeyEscrow::seal(&[7u8; 32], [1u8; 32], &material, ITERATIONS).unwrap();

        assert_ne!(a.key_spec.salt, b.key_spec.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_bundle_roundtrip() {
        let material = PasswordKeyMaterial::from_password("correct-password");
        let bundle = IdentityKeyBundle::generate();
        let (x25519, ed25519) = bundle.seal(&material, ITERATIONS).unwrap();

        let restored = IdentityKeyBundle::unwrap(&x25519, &ed25519, &material).unwrap();
        assert_eq!(restored.public_key(), bundle.public_key());
    }

    #[test]
    fn test_bundle_swapped_escrows_rejected() {
        let material = PasswordKeyMaterial::from_password("correct-password");
        let bundle = IdentityKeyBundle::generate();
        let (x25519, ed25519) = bundle.seal(&material, ITERATIONS).unwrap();

        let result = IdentityKeyBundle::unwrap(&ed25519, &x25519, &material);
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_escrow_wire_format() {
        let material = PasswordKeyMaterial::from_password("pw");
        let escrow = KeyEscrow::seal(&[7u8; 32], [1u8; 32], &material, ITERATIONS).unwrap();

        let json = serde_json::to_value(&escrow).unwrap();
        assert_eq!(json["key_spec"]["algorithm"], "pbkdf2_sha256");
        assert_eq!(json["key_spec"]["iterations"], ITERATIONS);
        assert!(json["data"].is_string());
        assert!(json["nonce"].is_string());

        let restored: KeyEscrow = serde_json::from_value(json).unwrap();
        assert_eq!(restored, escrow);
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let bundle = IdentityKeyBundle::generate();
        let debug = format!("{:?}", bundle);
        assert!(debug.contains("fingerprint"));
        assert!(!debug.contains(&hex::encode(bundle.signing().secret_bytes())));
    }
}
