//! # Neolith Core
//!
//! The client-side security core of the Neolith group-chat service:
//! password-based mutual login, recovery of escrowed identity keys, and
//! signed end-to-end encryption of channel posts and direct messages.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NEOLITH CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                          Session                                 │  │
//! │  │  login ─ join_channel ─ post ─ send_direct ─ handle_payload      │  │
//! │  └──────┬─────────────┬──────────────┬─────────────┬────────────────┘  │
//! │         │             │              │             │                    │
//! │  ┌──────▼──────┐ ┌────▼───────┐ ┌────▼───────┐ ┌───▼─────────┐         │
//! │  │    Auth     │ │  Channel   │ │ Messaging  │ │  Protocol   │         │
//! │  │             │ │            │ │            │ │             │         │
//! │  │ - SCRAM     │ │ - Modes    │ │ - Envelope │ │ - Packets   │         │
//! │  │ - Handshake │ │ - HKDF key │ │   per      │ │ - Txns      │         │
//! │  │ - Verifier  │ │ - Key ring │ │   member   │ │             │         │
//! │  └──────┬──────┘ └────┬───────┘ │ - Channel  │ └─────────────┘         │
//! │         │             │         │   envelope │                          │
//! │  ┌──────▼──────┐      │         └────┬───────┘ ┌─────────────┐         │
//! │  │  Identity   │      │              │         │  Transport  │         │
//! │  │ - Escrows   │      │              │         │ - Transport │         │
//! │  │ - Key pairs │      │              │         │ - Directory │         │
//! │  └──────┬──────┘      │              │         └─────────────┘         │
//! │         └─────────────┴──────┬───────┘                                  │
//! │                       ┌──────▼──────┐                                   │
//! │                       │   Crypto    │  X25519, Ed25519, AES-256-GCM,    │
//! │                       │             │  PBKDF2, HKDF                     │
//! │                       └─────────────┘                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error type for the entire library
//! - [`config`] - Session configuration
//! - [`crypto`] - Cryptographic primitives (keys, KDFs, AEAD, signatures)
//! - [`identity`] - Escrowed long-term identity keys
//! - [`auth`] - Login handshake
//! - [`channel`] - Channel modes and password-derived channel keys
//! - [`messaging`] - Signed, encrypted envelopes
//! - [`protocol`] - Packets and transactions
//! - [`transport`] - Transport and directory seams
//! - [`session`] - The session context tying it together
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Mutual Authentication (PBKDF2 + HMAC-SHA256)                 │
//! │  ─────────────────────────────────────────────────────                  │
//! │  The password never leaves the client. The server must prove it        │
//! │  holds the matching verifier before any of its data is trusted.        │
//! │                                                                         │
//! │  Layer 2: Escrowed Identity Keys (PBKDF2 + AES-256-GCM)                │
//! │  ──────────────────────────────────────────────────────                 │
//! │  Long-term keys are stored on the server wrapped under the password    │
//! │  and unwrapped locally only after the server has proven itself.        │
//! │                                                                         │
//! │  Layer 3: Message Encryption (X25519 + HKDF + AES-256-GCM)             │
//! │  ─────────────────────────────────────────────────────────              │
//! │  Every post is sealed per member under a fresh ephemeral key, or once  │
//! │  under a password-derived channel key.                                 │
//! │                                                                         │
//! │  Layer 4: Message Authentication (Ed25519 Signatures)                   │
//! │  ──────────────────────────────────────────────────────                 │
//! │  Every plaintext is signed and checked against the claimed sender's    │
//! │  directory key before it is delivered.                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod auth;
pub mod channel;
pub mod config;
pub mod crypto;
pub(crate) mod encoding;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod protocol;
pub mod session;
pub mod transport;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use auth::{AuthenticationHandshake, Credential, HandshakeState};
pub use channel::{derive_channel_key, ChannelKey, ChannelMode};
pub use config::SessionConfig;
pub use crypto::PublicKey;
pub use error::{Error, Result};
pub use identity::{IdentityKeyBundle, KeyEscrow};
pub use session::{Session, SessionEvent};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Neolith Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(!info.target.is_empty());
    }
}
