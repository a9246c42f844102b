//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest client nonce the handshake will generate
pub const MIN_CLIENT_NONCE_SIZE: usize = 16;

/// Configuration for a [`Session`](crate::session::Session)
///
/// Every field has a default, so a JSON config only needs the fields it
/// wants to change:
///
/// ```ignore
/// let config = SessionConfig::from_json(r#"{"nickname": "alice"}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Nickname sent with the login request
    pub nickname: String,

    /// Length of the random client nonce, at least 16 bytes
    pub client_nonce_size: usize,

    /// Lowest PBKDF2 iteration count accepted from a server challenge
    pub min_iterations: u32,

    /// Largest inbound payload the session will parse, in bytes
    pub max_message_size: usize,

    /// PBKDF2 iteration count used when sealing new key escrows
    pub escrow_iterations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nickname: "unnamed".to_string(),
            client_nonce_size: 32,
            min_iterations: 4096,
            max_message_size: 1024 * 1024,
            escrow_iterations: 200_000,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.nickname.trim().is_empty() {
            return Err(Error::InvalidConfig("nickname must not be empty".into()));
        }
        if self.client_nonce_size < MIN_CLIENT_NONCE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "client_nonce_size must be at least {} bytes, got {}",
                MIN_CLIENT_NONCE_SIZE, self.client_nonce_size
            )));
        }
        if self.min_iterations == 0 {
            return Err(Error::InvalidConfig("min_iterations must be positive".into()));
        }
        if self.escrow_iterations < self.min_iterations {
            return Err(Error::InvalidConfig(format!(
                "escrow_iterations ({}) is below min_iterations ({})",
                self.escrow_iterations, self.min_iterations
            )));
        }
        if self.max_message_size == 0 {
            return Err(Error::InvalidConfig("max_message_size must be positive".into()));
        }
        Ok(())
    }
}
