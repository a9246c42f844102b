//! # Key Derivation Functions
//!
//! This module turns passwords and shared secrets into key material.
//!
//! ## Derivation Modes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION MODES                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  (i) PASSWORD IMPORT                                                   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Credential.password ──► PasswordKeyMaterial                    │   │
//! │  │                                                                 │   │
//! │  │  • Opaque, zeroized on drop                                    │   │
//! │  │  • Not a key: only ever fed into PBKDF2                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │                                ▼                                        │
//! │  (ii) PASSWORD STRETCHING                                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  PBKDF2-HMAC-SHA256(                                           │   │
//! │  │    password   = PasswordKeyMaterial,                           │   │
//! │  │    salt       = server supplied,                               │   │
//! │  │    iterations = server supplied,                               │   │
//! │  │  ) → 32 bytes                                                  │   │
//! │  │                                                                 │   │
//! │  │  • PasswordDerivedKey  → SCRAM key schedule (login)            │   │
//! │  │  • EncryptionKey       → key escrow unwrap                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  (iii) SECRET EXPANSION                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  HKDF-SHA256(ikm, salt, info) → 32 bytes                       │   │
//! │  │                                                                 │   │
//! │  │  • Channel key:  ikm = channel password                        │   │
//! │  │                  salt = server public key                      │   │
//! │  │                  info = channel name                           │   │
//! │  │                                                                 │   │
//! │  │  • Message key:  ikm = X25519 shared secret                    │   │
//! │  │                  salt = ephemeral public key                   │   │
//! │  │                  info = "neolith-message-encryption-v1" ‖ nonce│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mode (iii) never stretches: its inputs are either high-entropy shared
//! secrets or strings that are bound to a server and a channel by the salt
//! and info parameters. Mode (ii) is the only place iterations appear.

use std::fmt;

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::crypto::encryption::{EncryptionKey, Nonce, KEY_SIZE};
use crate::error::{Error, Result};

/// Domain separation strings for HKDF and the SCRAM key schedule
pub mod domain {
    /// Info prefix for per-envelope message keys
    pub const MESSAGE_ENCRYPTION: &[u8] = b"neolith-message-encryption-v1";

    /// HMAC label for the SCRAM client key
    pub const SCRAM_CLIENT_KEY: &[u8] = b"Client Key";

    /// HMAC label for the SCRAM server key
    pub const SCRAM_SERVER_KEY: &[u8] = b"Server Key";
}

/// Length of every derived key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

/// The only password hashing algorithm the client accepts
pub const PBKDF2_SHA256: &str = "pbkdf2_sha256";

fn default_algorithm() -> String {
    PBKDF2_SHA256.to_string()
}

/// Server-supplied password stretching parameters
///
/// Carried by the login challenge and by each key escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSpec {
    /// Hash algorithm name
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// PBKDF2 salt
    #[serde(with = "crate::encoding::b64")]
    pub salt: Vec<u8>,

    /// PBKDF2 iteration count
    pub iterations: u32,
}

impl PasswordSpec {
    /// PBKDF2-HMAC-SHA256 parameters
    pub fn pbkdf2_sha256(salt: Vec<u8>, iterations: u32) -> Self {
        Self {
            algorithm: default_algorithm(),
            salt,
            iterations,
        }
    }

    /// Whether the client knows how to evaluate this spec
    pub fn is_supported(&self) -> bool {
        self.algorithm == PBKDF2_SHA256
    }

    fn check_algorithm(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(Error::KeyDerivationFailed(format!(
                "Unsupported password algorithm: {}",
                self.algorithm
            )))
        }
    }

    /// Derive the login key under these parameters
    pub fn derive_password_key(&self, material: &PasswordKeyMaterial) -> Result<PasswordDerivedKey> {
        self.check_algorithm()?;
        derive_password_key(material, &self.salt, self.iterations)
    }

    /// Derive an escrow key under these parameters
    pub fn derive_escrow_key(&self, material: &PasswordKeyMaterial) -> Result<EncryptionKey> {
        self.check_algorithm()?;
        derive_escrow_key(material, &self.salt, self.iterations)
    }
}

/// A password imported as KDF input
///
/// This is not a key. The only thing it can do is feed PBKDF2.
#[derive(Clone)]
pub struct PasswordKeyMaterial(Zeroizing<Vec<u8>>);

impl PasswordKeyMaterial {
    /// Import a password
    pub fn from_password(password: &str) -> Self {
        Self(Zeroizing::new(password.as_bytes().to_vec()))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PasswordKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordKeyMaterial(<redacted>)")
    }
}

/// PBKDF2 output used as the root of the SCRAM key schedule
///
/// Never used directly as an encryption key.
#[derive(ZeroizeOnDrop)]
pub struct PasswordDerivedKey([u8; DERIVED_KEY_SIZE]);

impl PasswordDerivedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.0
    }
}

fn stretch(
    material: &PasswordKeyMaterial,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    if iterations == 0 {
        return Err(Error::KeyDerivationFailed(
            "PBKDF2 iteration count must be positive".into(),
        ));
    }
    if salt.is_empty() {
        return Err(Error::KeyDerivationFailed("PBKDF2 salt is empty".into()));
    }

    let mut out = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(material.as_bytes(), salt, iterations, &mut out[..]);
    Ok(out)
}

/// Derive the login key from a password and the server's challenge parameters
///
/// ## Errors
///
/// `KeyDerivationFailed` if `iterations` is zero or `salt` is empty.
pub fn derive_password_key(
    material: &PasswordKeyMaterial,
    salt: &[u8],
    iterations: u32,
) -> Result<PasswordDerivedKey> {
    let stretched = stretch(material, salt, iterations)?;
    Ok(PasswordDerivedKey(*stretched))
}

/// Derive the AES-256-GCM key protecting a key escrow
pub fn derive_escrow_key(
    material: &PasswordKeyMaterial,
    salt: &[u8],
    iterations: u32,
) -> Result<EncryptionKey> {
    let stretched = stretch(material, salt, iterations)?;
    Ok(EncryptionKey::from_bytes(*stretched))
}

/// Derive the raw channel key material
///
/// ```text
/// HKDF-SHA256(ikm = channel_password, salt = server_public_key, info = channel_name)
/// ```
///
/// Pure: identical inputs always give identical output.
pub fn derive_channel_key_material(
    channel_password: &[u8],
    server_public_key: &[u8],
    channel_name: &str,
) -> Result<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    let hkdf = Hkdf::<Sha256>::new(Some(server_public_key), channel_password);

    let mut okm = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    hkdf.expand(channel_name.as_bytes(), &mut okm[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive channel key".into()))?;

    Ok(okm)
}

/// Derive the AEAD key for a single envelope
///
/// The ephemeral public key salts the extraction and the envelope nonce is
/// part of the info, so a key is tied to exactly one envelope.
pub fn derive_message_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    nonce: &Nonce,
) -> Result<EncryptionKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(ephemeral_public), shared_secret);

    let mut info = Vec::with_capacity(domain::MESSAGE_ENCRYPTION.len() + nonce.as_bytes().len());
    info.extend_from_slice(domain::MESSAGE_ENCRYPTION);
    info.extend_from_slice(nonce.as_bytes());

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(&info, &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive message key".into()))?;

    Ok(EncryptionKey::from_bytes(*key))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_key_deterministic() {
        let material = PasswordKeyMaterial::from_password("hunter2");

        let key1 = derive_password_key(&material, b"salt", 1000).unwrap();
        let key2 = derive_password_key(&material, b"salt", 1000).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_password_key_depends_on_every_input() {
        let material = PasswordKeyMaterial::from_password("hunter2");
        let base = derive_password_key(&material, b"salt", 1000).unwrap();

        let other_salt = derive_password_key(&material, b"pepper", 1000).unwrap();
        let other_rounds = derive_password_key(&material, b"salt", 1001).unwrap();
        let other_password =
            derive_password_key(&PasswordKeyMaterial::from_password("hunter3"), b"salt", 1000)
                .unwrap();

        assert_ne!(base.as_bytes(), other_salt.as_bytes());
        assert_ne!(base.as_bytes(), other_rounds.as_bytes());
        assert_ne!(base.as_bytes(), other_password.as_bytes());
    }

    #[test]
    fn test_pbkdf2_known_vector() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256, first 32 bytes
        let material = PasswordKeyMaterial::from_password("passwd");
        let key = derive_password_key(&material, b"salt", 1).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let material = PasswordKeyMaterial::from_password("hunter2");

        assert!(matches!(
            derive_password_key(&material, b"salt", 0),
            Err(Error::KeyDerivationFailed(_))
        ));
        assert!(matches!(
            derive_password_key(&material, b"", 1000),
            Err(Error::KeyDerivationFailed(_))
        ));
        assert!(derive_escrow_key(&material, b"", 1000).is_err());
    }

    #[test]
    fn test_password_spec_matches_free_functions() {
        let material = PasswordKeyMaterial::from_password("hunter2");
        let spec = PasswordSpec::pbkdf2_sha256(b"salt".to_vec(), 1000);

        let via_spec = spec.derive_password_key(&material).unwrap();
        let direct = derive_password_key(&material, b"salt", 1000).unwrap();
        assert_eq!(via_spec.as_bytes(), direct.as_bytes());
    }

    #[test]
    fn test_password_spec_unknown_algorithm_rejected() {
        let material = PasswordKeyMaterial::from_password("hunter2");
        let spec = PasswordSpec {
            algorithm: "md5".into(),
            salt: b"salt".to_vec(),
            iterations: 1000,
        };

        assert!(!spec.is_supported());
        assert!(spec.derive_password_key(&material).is_err());
        assert!(spec.derive_escrow_key(&material).is_err());
    }

    #[test]
    fn test_password_spec_wire_format() {
        let json = r#"{"salt": "c2FsdA==", "iterations": 200000}"#;
        let spec: PasswordSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.algorithm, PBKDF2_SHA256);
        assert_eq!(spec.salt, b"salt");
        assert_eq!(spec.iterations, 200000);
    }

    #[test]
    fn test_password_material_debug_redacted() {
        let material = PasswordKeyMaterial::from_password("hunter2");
        assert!(!format!("{:?}", material).contains("hunter2"));
    }

    #[test]
    fn test_channel_key_material_binding() {
        let a = derive_channel_key_material(b"pw", b"server", "#rust").unwrap();
        let b = derive_channel_key_material(b"pw", b"server", "#rust").unwrap();
        let other_channel = derive_channel_key_material(b"pw", b"server", "#go").unwrap();
        let other_server = derive_channel_key_material(b"pw", b"server2", "#rust").unwrap();

        assert_eq!(*a, *b);
        assert_ne!(*a, *other_channel);
        assert_ne!(*a, *other_server);
    }

    #[test]
    fn test_message_key_bound_to_nonce_and_ephemeral() {
        let shared = [7u8; 32];
        let ephemeral = [9u8; 32];
        let nonce1 = Nonce::from_bytes([1u8; 12]);
        let nonce2 = Nonce::from_bytes([2u8; 12]);

        let k1 = derive_message_key(&shared, &ephemeral, &nonce1).unwrap();
        let k1_again = derive_message_key(&shared, &ephemeral, &nonce1).unwrap();
        let k2 = derive_message_key(&shared, &ephemeral, &nonce2).unwrap();
        let k3 = derive_message_key(&shared, &[10u8; 32], &nonce1).unwrap();

        assert_eq!(k1.as_bytes(), k1_again.as_bytes());
        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }
}
