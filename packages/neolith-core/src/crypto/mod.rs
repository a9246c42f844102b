//! # Cryptography Module
//!
//! The primitives the protocol is composed from.
//!
//! ## Primitives
//!
//! | Purpose | Algorithm | Crate |
//! |---------|-----------|-------|
//! | Password stretching | PBKDF2-HMAC-SHA256 | `pbkdf2` |
//! | Secret expansion | HKDF-SHA256 | `hkdf` |
//! | Login proofs | HMAC-SHA256 | `hmac` |
//! | Authenticated encryption | AES-256-GCM | `aes-gcm` |
//! | Key agreement | X25519 | `x25519-dalek` |
//! | Signatures | Ed25519 | `ed25519-dalek` |
//!
//! ## Security Principles
//!
//! 1. **Zeroization**: every secret type zeroizes on drop
//! 2. **No nonce reuse**: nonces come from the OS RNG, envelope keys are
//!    additionally bound to their nonce
//! 3. **Fail closed**: a failed tag or signature is an error, never a
//!    degraded result
//! 4. **Constant time**: proof comparisons use `subtle`

mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encryption::{
    decrypt, encrypt, encrypt_with_nonce, EncryptionKey, Nonce, SharedSecret, KEY_SIZE,
    NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{
    derive_channel_key_material, derive_escrow_key, derive_message_key, derive_password_key,
    domain, PasswordDerivedKey, PasswordKeyMaterial, PasswordSpec, DERIVED_KEY_SIZE,
    PBKDF2_SHA256,
};
pub use keys::{AgreementKeyPair, EphemeralKeyPair, PublicKey, SigningKeyPair};
pub use signing::{sign, verify, verify_with_key, Signature, SIGNATURE_SIZE};

/// Size of public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
