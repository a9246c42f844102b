//! # Messaging Module
//!
//! Signed, encrypted envelopes for channel posts and direct messages.
//!
//! ## Identity-Keyed Envelope (one per recipient)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENVELOPE ENCRYPTION                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender (Alice), for each recipient (Bob, Carol, ...)                  │
//! │  ─────────────────────────────────────────────────────────────         │
//! │                                                                         │
//! │  1. Fresh ephemeral keypair and nonce                                  │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  (eph_secret, eph_public) = X25519::generate()              │       │
//! │  │  nonce = random_12_bytes                                    │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  2. Agree and derive                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  shared = eph_secret × bob_x25519_public                   │       │
//! │  │  key = HKDF(shared, salt = eph_public,                     │       │
//! │  │             info = "neolith-message-encryption-v1" ‖ nonce)│       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  3. Encrypt and sign                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  data = AES-256-GCM(key, nonce, plaintext)                 │       │
//! │  │  signature = Ed25519(alice_signing_key, plaintext)         │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Output: { ephemeral_key, nonce, data, signature }                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decryption Order
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENVELOPE DECRYPTION                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. shared = bob_x25519_secret × eph_public   ──► KeyExchangeFailed    │
//! │  2. key = HKDF(...) as above                                           │
//! │  3. AES-256-GCM open                          ──► DecryptionFailed     │
//! │  4. Ed25519 verify against the claimed                                 │
//! │     sender's directory key                    ──► VerificationFailed   │
//! │  5. Deliver plaintext                                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DecryptionFailed` means garbage or tampering. `VerificationFailed`
//! means the content is intact but was not written by the claimed sender.
//! Neither ever yields plaintext.
//!
//! The password-keyed variant lives in [`channel`](self::channel) and uses
//! one shared channel key instead of per-recipient agreement.

mod channel;

pub use channel::{decrypt_channel_envelope, encrypt_for_channel, ChannelEnvelope};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{
    decrypt, encrypt_with_nonce, sign, verify, AgreementKeyPair, EphemeralKeyPair, Nonce,
    PublicKey, Signature, SigningKeyPair,
};
use crate::error::{Error, Result};

/// Largest plaintext accepted for encryption, in bytes
pub const MAX_PLAINTEXT_SIZE: usize = 64 * 1024;

/// One encrypted, signed message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Sender's ephemeral X25519 public key
    #[serde(rename = "ephemeral_key", with = "crate::encoding::b64_array")]
    pub ephemeral_public_key: [u8; 32],

    /// AES-GCM nonce
    pub nonce: Nonce,

    /// Ciphertext with tag
    #[serde(rename = "data", with = "crate::encoding::b64")]
    pub ciphertext: Vec<u8>,

    /// Ed25519 signature over the plaintext
    pub signature: Signature,
}

/// A member to encrypt for, as resolved through the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Session identifier of the member
    pub id: String,

    /// Published keys, if the member has any
    pub keys: Option<PublicKey>,
}

impl Recipient {
    /// A recipient with published keys
    pub fn new(id: impl Into<String>, keys: PublicKey) -> Self {
        Self {
            id: id.into(),
            keys: Some(keys),
        }
    }
}

/// The complete output of one multi-recipient encryption
#[derive(Debug, Clone, Default)]
pub struct EnvelopeSet {
    /// Envelope per recipient id
    pub envelopes: BTreeMap<String, EncryptedEnvelope>,

    /// Recipients that could not be encrypted for
    pub skipped: Vec<String>,
}

fn check_plaintext_size(plaintext: &[u8]) -> Result<()> {
    if plaintext.len() > MAX_PLAINTEXT_SIZE {
        return Err(Error::InvalidMessageContent(format!(
            "Message too large: {} bytes (max {})",
            plaintext.len(),
            MAX_PLAINTEXT_SIZE
        )));
    }
    Ok(())
}

fn seal(
    plaintext: &[u8],
    recipient_agreement_key: &[u8; 32],
    signature: Signature,
) -> Result<EncryptedEnvelope> {
    let ephemeral = EphemeralKeyPair::generate();
    let ephemeral_public_key = ephemeral.public_bytes();
    let nonce = Nonce::random();

    let shared = ephemeral.diffie_hellman(recipient_agreement_key)?;
    let key = shared.derive_message_key(&ephemeral_public_key, &nonce)?;
    let ciphertext = encrypt_with_nonce(&key, &nonce, plaintext, &[])?;

    Ok(EncryptedEnvelope {
        ephemeral_public_key,
        nonce,
        ciphertext,
        signature,
    })
}

/// Encrypt one message for a single recipient
///
/// Used for direct messages.
pub fn encrypt_for_recipient(
    plaintext: &[u8],
    recipient_agreement_key: &[u8; 32],
    signer: &SigningKeyPair,
) -> Result<EncryptedEnvelope> {
    check_plaintext_size(plaintext)?;
    seal(plaintext, recipient_agreement_key, sign(signer, plaintext))
}

/// Encrypt one message for every recipient
///
/// Each envelope gets its own ephemeral keypair and nonce. Recipients
/// without published keys, or whose key cannot be agreed with, are listed
/// in `skipped`. Any other failure aborts the whole set, so a partial set
/// is never returned.
pub fn encrypt_for_recipients(
    plaintext: &[u8],
    recipients: &[Recipient],
    signer: &SigningKeyPair,
) -> Result<EnvelopeSet> {
    check_plaintext_size(plaintext)?;
    let signature = sign(signer, plaintext);

    let mut set = EnvelopeSet::default();
    for recipient in recipients {
        let Some(keys) = recipient.keys.as_ref() else {
            tracing::debug!("Skipping {}: no published keys", recipient.id);
            set.skipped.push(recipient.id.clone());
            continue;
        };

        match seal(plaintext, &keys.agreement, signature) {
            Ok(envelope) => {
                set.envelopes.insert(recipient.id.clone(), envelope);
            }
            Err(e @ Error::KeyExchangeFailed(_)) => {
                tracing::warn!("Skipping {}: {}", recipient.id, e);
                set.skipped.push(recipient.id.clone());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(set)
}

/// Open an envelope addressed to us
///
/// ## Errors
///
/// - `KeyExchangeFailed`: the ephemeral key is a low-order point
/// - `DecryptionFailed`: the ciphertext, nonce or key do not match
/// - `VerificationFailed`: the plaintext was not signed by `expected_signer`
pub fn decrypt_envelope(
    envelope: &EncryptedEnvelope,
    my_key: &AgreementKeyPair,
    expected_signer: &[u8; 32],
) -> Result<Vec<u8>> {
    let shared = my_key.diffie_hellman(&envelope.ephemeral_public_key)?;
    let key = shared.derive_message_key(&envelope.ephemeral_public_key, &envelope.nonce)?;

    let mut plaintext = decrypt(&key, &envelope.nonce, &envelope.ciphertext, &[])?;
    if let Err(e) = verify(expected_signer, &plaintext, &envelope.signature) {
        plaintext.zeroize();
        return Err(e);
    }

    Ok(plaintext)
}

// ============================================================================
// TESTS
// ============================================================================
