//! # Channel Module
//!
//! Channel metadata, mode selection and password-derived channel keys.
//!
//! ## Channel Modes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CHANNEL MODES                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  encrypted │ password_protected │ mode           │ posts carry          │
//! │  ──────────┼────────────────────┼────────────────┼───────────────────   │
//! │  false     │ (ignored)          │ Open           │ plain chat text      │
//! │  true      │ false              │ IdentityKeyed  │ one envelope per     │
//! │            │                    │                │ member               │
//! │  true      │ true               │ PasswordKeyed  │ one envelope under   │
//! │            │                    │                │ the channel key      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Channel Key Derivation
//!
//! ```text
//! channel_password ──┐
//! server_public_key ─┼──► HKDF-SHA256 ──► 32 bytes ──┬──► AES-256-GCM key (stays local)
//! channel_name ──────┘                               │
//!                                                    └──► SHA-256 ──► identifying_hash
//! ```
//!
//! The identifying hash is announced on join so the server can check that
//! everyone in the channel holds the same key. It reveals nothing about
//! the key itself.

mod ring;

pub use ring::ChannelKeyRing;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{derive_channel_key_material, EncryptionKey};
use crate::error::Result;

/// Size of the channel identifying hash in bytes
pub const KEY_HASH_SIZE: usize = 32;

/// A channel as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Unique channel name
    pub name: String,

    /// Channel topic
    #[serde(default)]
    pub topic: String,

    /// Whether the channel can be removed
    #[serde(default)]
    pub protected: bool,

    /// Whether the channel is invitation-only
    #[serde(default)]
    pub private: bool,

    /// Whether posts must be encrypted
    #[serde(default)]
    pub encrypted: bool,

    /// Whether posts are encrypted under a shared channel password
    #[serde(default)]
    pub password_protected: bool,
}

impl ChannelInfo {
    /// An unencrypted channel
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: String::new(),
            protected: false,
            private: false,
            encrypted: false,
            password_protected: false,
        }
    }

    /// The mode posts to this channel use
    pub fn mode(&self) -> ChannelMode {
        ChannelMode::select(self)
    }
}

/// How posts to a channel are protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// Plain text
    Open,
    /// One signed envelope per member, under ephemeral X25519 agreement
    IdentityKeyed,
    /// One signed envelope under the shared channel key
    PasswordKeyed,
}

impl ChannelMode {
    /// Pick the mode for a channel
    pub fn select(info: &ChannelInfo) -> Self {
        match (info.encrypted, info.password_protected) {
            (false, _) => ChannelMode::Open,
            (true, false) => ChannelMode::IdentityKeyed,
            (true, true) => ChannelMode::PasswordKeyed,
        }
    }

    /// Whether posts in this mode are encrypted
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, ChannelMode::Open)
    }
}

/// A symmetric key shared by everyone who knows the channel password
pub struct ChannelKey {
    key: EncryptionKey,
    identifying_hash: [u8; KEY_HASH_SIZE],
}

impl ChannelKey {
    /// The public hash of the key
    pub fn identifying_hash(&self) -> &[u8; KEY_HASH_SIZE] {
        &self.identifying_hash
    }

    /// Build the announcement sent when joining `channel_name`
    pub fn announcement(&self, channel_name: &str) -> ChannelKeyAnnouncement {
        ChannelKeyAnnouncement {
            channel_name: channel_name.to_string(),
            identifying_hash: self.identifying_hash,
        }
    }

    pub(crate) fn encryption_key(&self) -> &EncryptionKey {
        &self.key
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelKey")
            .field("identifying_hash", &hex::encode(self.identifying_hash))
            .finish_non_exhaustive()
    }
}

/// Proof of channel key knowledge, safe to send to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelKeyAnnouncement {
    /// Channel the key belongs to
    #[serde(rename = "channel")]
    pub channel_name: String,

    /// `SHA-256` of the derived key bytes
    #[serde(rename = "key_hash", with = "crate::encoding::b64_array")]
    pub identifying_hash: [u8; KEY_HASH_SIZE],
}

/// Derive a channel key
///
/// Deterministic: two members with the same channel name, password and
/// server obtain the same key and hash.
pub fn derive_channel_key(
    channel_name: &str,
    channel_password: &str,
    server_public_key: &[u8],
) -> Result<ChannelKey> {
    let derived =
        derive_channel_key_material(channel_password.as_bytes(), server_public_key, channel_name)?;

    let identifying_hash: [u8; KEY_HASH_SIZE] = Sha256::digest(*derived).into();
    Ok(ChannelKey {
        key: EncryptionKey::from_bytes(*derived),
        identifying_hash,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &[u8] = b"server-public-key-0123456789abcd";

    #[test]
    fn test_derivation_deterministic() {
        let a = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        let b = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();

        assert_eq!(a.identifying_hash(), b.identifying_hash());
        assert_eq!(a.encryption_key().as_bytes(), b.encryption_key().as_bytes());
    }

    #[test]
    fn test_name_changes_key() {
        let a = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        let b = derive_channel_key("#random", "hunter2", SERVER_KEY).unwrap();

        assert_ne!(a.identifying_hash(), b.identifying_hash());
        assert_ne!(a.encryption_key().as_bytes(), b.encryption_key().as_bytes());
    }

    #[test]
    fn test_server_and_password_change_key() {
        let base = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        let other_server = derive_channel_key("#general", "hunter2", b"another-server").unwrap();
        let other_password = derive_channel_key("#general", "hunter3", SERVER_KEY).unwrap();

        assert_ne!(base.identifying_hash(), other_server.identifying_hash());
        assert_ne!(base.identifying_hash(), other_password.identifying_hash());
    }

    #[test]
    fn test_hash_is_not_the_key() {
        let key = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        assert_ne!(key.identifying_hash(), key.encryption_key().as_bytes());

        let expected: [u8; 32] = Sha256::digest(key.encryption_key().as_bytes()).into();
        assert_eq!(key.identifying_hash(), &expected);
    }

    #[test]
    fn test_mode_selection() {
        let mut info = ChannelInfo::open("#general");
        assert_eq!(ChannelMode::select(&info), ChannelMode::Open);

        info.password_protected = true;
        assert_eq!(info.mode(), ChannelMode::Open);

        info.encrypted = true;
        assert_eq!(info.mode(), ChannelMode::PasswordKeyed);

        info.password_protected = false;
        assert_eq!(info.mode(), ChannelMode::IdentityKeyed);
        assert!(info.mode().is_encrypted());
    }

    #[test]
    fn test_announcement_wire_format() {
        let key = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        let announcement = key.announcement("#general");

        let json = serde_json::to_value(&announcement).unwrap();
        assert_eq!(json["channel"], "#general");
        assert!(json["key_hash"].is_string());

        let restored: ChannelKeyAnnouncement = serde_json::from_value(json).unwrap();
        assert_eq!(restored, announcement);
    }

    #[test]
    fn test_channel_info_defaults() {
        let info: ChannelInfo = serde_json::from_str(r##"{"name": "#lobby"}"##).unwrap();
        assert_eq!(info, ChannelInfo::open("#lobby"));
    }

    #[test]
    fn test_debug_hides_key() {
        let key = derive_channel_key("#general", "hunter2", SERVER_KEY).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains(&hex::encode(key.identifying_hash())));
        assert!(!debug.contains(&hex::encode(key.encryption_key().as_bytes())));
    }
}
