//! # Error Handling
//!
//! This module provides the error type shared by every Neolith Core
//! operation.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Handshake Errors (terminal for the login attempt)                 │
//! │  │   ├── ChallengeBinding      - Server nonce does not extend ours     │
//! │  │   ├── ServerAuthentication  - Server proof mismatch                 │
//! │  │   ├── AuthenticationFailed  - Server refused the login              │
//! │  │   ├── HandshakeState        - Step called out of order              │
//! │  │   └── NotAuthenticated      - Traffic before the handshake ended    │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── KeyDerivationFailed   - PBKDF2/HKDF rejected its input        │
//! │  │   ├── EncryptionFailed      - AEAD encryption failed                │
//! │  │   ├── DecryptionFailed      - AEAD tag did not verify               │
//! │  │   ├── VerificationFailed    - Signature did not verify              │
//! │  │   ├── InvalidKey            - Malformed key bytes                   │
//! │  │   ├── KeyExchangeFailed     - Non-contributory agreement            │
//! │  │   └── KeyUnavailable        - No key material for that party        │
//! │  │                                                                      │
//! │  ├── Protocol / Transport Errors                                       │
//! │  │   ├── ProtocolError         - Packet violates the protocol          │
//! │  │   ├── NotConnected          - Transport is closed                   │
//! │  │   └── TransportError        - Transport refused the payload         │
//! │  │                                                                      │
//! │  └── Message / Internal Errors                                         │
//! │      ├── InvalidMessageContent - Plaintext is not valid content        │
//! │      ├── Serialization         - JSON encoding failed                  │
//! │      ├── Deserialization       - JSON/base64 decoding failed           │
//! │      └── Internal              - Invariant broken inside the crate     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DecryptionFailed` and `VerificationFailed` are deliberately separate:
//! the first means garbage or tampering, the second means the content
//! decrypted fine but was not written by the claimed sender.

use thiserror::Error;

/// Result type alias for Neolith Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Neolith Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Handshake Errors (100-199)
    // ========================================================================

    /// The server's challenge nonce does not begin with the client nonce
    #[error("Challenge binding failed: {0}")]
    ChallengeBinding(String),

    /// The server's proof does not match the one computed from the password
    #[error("Server authentication failed: server proof mismatch")]
    ServerAuthentication,

    /// The server rejected the login attempt
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A handshake step was invoked in the wrong state
    #[error("Invalid handshake state: {0}")]
    HandshakeState(String),

    /// Operation requires a completed handshake
    #[error("Session is not authenticated.")]
    NotAuthenticated,

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (authentication tag mismatch)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    VerificationFailed,

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Key exchange failed
    #[error("Key exchange failed: {0}")]
    KeyExchangeFailed(String),

    /// Required key material is not available
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    // ========================================================================
    // Protocol / Transport Errors (500-599)
    // ========================================================================

    /// Protocol-level error
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Not connected to the server
    #[error("Not connected to the server.")]
    NotConnected,

    /// Transport error
    #[error("Transport error: {0}")]
    TransportError(String),

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================

    /// Invalid message content
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Handshake
    /// - 300-399: Crypto
    /// - 500-599: Protocol / transport
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Handshake (100-199)
            Error::ChallengeBinding(_) => 100,
            Error::ServerAuthentication => 101,
            Error::AuthenticationFailed(_) => 102,
            Error::HandshakeState(_) => 103,
            Error::NotAuthenticated => 104,

            // Crypto (300-399)
            Error::KeyDerivationFailed(_) => 300,
            Error::EncryptionFailed(_) => 301,
            Error::DecryptionFailed(_) => 302,
            Error::VerificationFailed => 303,
            Error::InvalidKey(_) => 304,
            Error::KeyExchangeFailed(_) => 305,
            Error::KeyUnavailable(_) => 306,

            // Protocol (500-599)
            Error::ProtocolError(_) => 500,
            Error::NotConnected => 501,
            Error::TransportError(_) => 502,

            // Messages (700-799)
            Error::InvalidMessageContent(_) => 700,

            // Internal (900-999)
            Error::InvalidConfig(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
            Error::Internal(_) => 999,
        }
    }

    /// Check if this error terminates a login attempt
    ///
    /// The session surfaces every one of these as a single terminal
    /// authentication failure and never exposes a partially authenticated
    /// state afterwards.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::ChallengeBinding(_)
                | Error::ServerAuthentication
                | Error::AuthenticationFailed(_)
        )
    }

    /// The message was garbage or was modified in transit
    pub fn is_tamper(&self) -> bool {
        matches!(self, Error::DecryptionFailed(_) | Error::KeyExchangeFailed(_))
    }

    /// The message decrypted but was not signed by the claimed sender
    pub fn is_impersonation(&self) -> bool {
        matches!(self, Error::VerificationFailed)
    }

    /// Check if this error is recoverable by reconnecting and retrying
    ///
    /// Verification failures are never recoverable: they are reported and
    /// the affected operation is dropped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NotConnected | Error::TransportError(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DeserializationError(format!("Invalid base64: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================
