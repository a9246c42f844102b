//! Password-keyed channel envelopes.
//!
//! Every member holds the same channel key, so the envelope is built once
//! per message. The channel name is the AEAD associated data, which stops a
//! ciphertext from being replayed into another channel that happens to
//! share the password. The plaintext is still signed with the poster's
//! long-term key: the shared key says "a member wrote this", the signature
//! says which one.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::check_plaintext_size;
use crate::channel::ChannelKey;
use crate::crypto::{decrypt, encrypt, sign, verify, Nonce, Signature, SigningKeyPair};
use crate::error::Result;

/// One encrypted, signed message under a channel key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    /// AES-GCM nonce
    pub nonce: Nonce,

    /// Ciphertext with tag
    #[serde(rename = "data", with = "crate::encoding::b64")]
    pub ciphertext: Vec<u8>,

    /// Ed25519 signature over the plaintext
    pub signature: Signature,
}

/// Encrypt a post for a password-keyed channel
pub fn encrypt_for_channel(
    plaintext: &[u8],
    channel_key: &ChannelKey,
    channel_name: &str,
    signer: &SigningKeyPair,
) -> Result<ChannelEnvelope> {
    check_plaintext_size(plaintext)?;

    let (nonce, ciphertext) = encrypt(
        channel_key.encryption_key(),
        plaintext,
        channel_name.as_bytes(),
    )?;

    Ok(ChannelEnvelope {
        nonce,
        ciphertext,
        signature: sign(signer, plaintext),
    })
}

/// Open a post from a password-keyed channel
///
/// Same failure kinds as [`decrypt_envelope`](super::decrypt_envelope),
/// minus key agreement.
pub fn decrypt_channel_envelope(
    envelope: &ChannelEnvelope,
    channel_key: &ChannelKey,
    channel_name: &str,
    expected_signer: &[u8; 32],
) -> Result<Vec<u8>> {
    let mut plaintext = decrypt(
        channel_key.encryption_key(),
        &envelope.nonce,
        &envelope.ciphertext,
        channel_name.as_bytes(),
    )?;

    if let Err(e) = verify(expected_signer, &plaintext, &envelope.signature) {
        plaintext.zeroize();
        return Err(e);
    }

    Ok(plaintext)
}
