//! # Authentication Module
//!
//! SCRAM-style mutual authentication. The password never leaves the client;
//! the server proves it holds the matching verifier before the client
//! trusts anything it sends.
//!
//! ## Handshake
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LOGIN HANDSHAKE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Client                                              Server            │
//! │    │                                                    │               │
//! │    │  challenge { username, nonce = N1 }                │               │
//! │    │───────────────────────────────────────────────────►│               │
//! │    │                                       [ChallengeSent]              │
//! │    │                                                    │               │
//! │    │  challenge.response { nonce = N1‖N2, password_spec }               │
//! │    │◄───────────────────────────────────────────────────│               │
//! │    │                                                    │               │
//! │    │  check N1‖N2 starts with N1 and is longer          │               │
//! │    │  check algorithm and iteration floor               │               │
//! │    │  derive client proof, precompute server proof      │               │
//! │    │                                                    │               │
//! │    │  login { nonce = N1‖N2, proof, nickname }          │               │
//! │    │───────────────────────────────────────────────────►│               │
//! │    │                                           [ProofSent]              │
//! │    │                                                    │               │
//! │    │  login.response { proof, session_id,               │               │
//! │    │                   server_public_key, x25519, ed25519 }             │
//! │    │◄───────────────────────────────────────────────────│               │
//! │    │                                                    │               │
//! │    │  constant-time compare of the server proof         │               │
//! │    │  only then: unwrap both key escrows                │               │
//! │    │                                                    │               │
//! │    ▼                                                    │               │
//! │  [Authenticated]  or  [Rejected]                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure moves the handshake to `Rejected` and wipes the password
//! material, the derived proofs and the nonces. A rejected handshake never
//! yields identity keys.

mod scram;

pub use scram::{proofs_match, ScramVerifier, PROOF_SIZE};

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::{SessionConfig, MIN_CLIENT_NONCE_SIZE};
use crate::crypto::{PasswordKeyMaterial, PasswordSpec};
use crate::error::{Error, Result};
use crate::identity::{IdentityKeyBundle, KeyEscrow};

// ============================================================================
// CREDENTIAL
// ============================================================================

/// A username and password typed by the user
///
/// Not serializable and never printed. Consumed by
/// [`AuthenticationHandshake::start`].
pub struct Credential {
    username: String,
    password: Zeroizing<String>,
}

impl Credential {
    /// Create a credential
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The account name
    pub fn username(&self) -> &str {
        &self.username
    }

    fn into_parts(self) -> (String, PasswordKeyMaterial) {
        let material = PasswordKeyMaterial::from_password(&self.password);
        (self.username, material)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// `challenge`: opens a login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Account to log in as
    pub username: String,

    /// Fresh random client nonce
    #[serde(with = "crate::encoding::b64")]
    pub nonce: Vec<u8>,
}

/// `challenge.response`: the server's challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// Client nonce followed by the server's own nonce
    #[serde(with = "crate::encoding::b64")]
    pub nonce: Vec<u8>,

    /// How the account password is stretched
    pub password_spec: PasswordSpec,

    /// Display name of the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// `login`: the client's proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// The full challenge nonce being answered
    #[serde(with = "crate::encoding::b64")]
    pub nonce: Vec<u8>,

    /// `client_key XOR client_signature`
    #[serde(with = "crate::encoding::b64_array")]
    pub proof: [u8; PROOF_SIZE],

    /// Requested nickname
    pub nickname: String,
}

/// `login.response`: the server's proof and the escrowed identity keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    /// `HMAC(server_key, nonce)`
    #[serde(with = "crate::encoding::b64_array")]
    pub proof: [u8; PROOF_SIZE],

    /// Public session identifier
    pub session_id: String,

    /// Server-wide public key, used as the channel key salt
    #[serde(with = "crate::encoding::b64")]
    pub server_public_key: Vec<u8>,

    /// Escrowed X25519 secret
    pub x25519: KeyEscrow,

    /// Escrowed Ed25519 secret
    pub ed25519: KeyEscrow,

    /// Display name of the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Token for the web API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// What a successful login leaves behind, apart from the identity keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Account name
    pub username: String,
    /// Public session identifier
    pub session_id: String,
    /// Server-wide public key
    pub server_public_key: Vec<u8>,
    /// Display name of the server
    pub server_name: Option<String>,
    /// Token for the web API
    pub token: Option<String>,
}

// ============================================================================
// HANDSHAKE
// ============================================================================

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Idle,
    /// Challenge request sent, waiting for the server's challenge
    ChallengeSent,
    /// Proof sent, waiting for the server's proof
    ProofSent,
    /// Both sides proved themselves
    Authenticated,
    /// The attempt failed
    Rejected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::ChallengeSent => "challenge-sent",
            HandshakeState::ProofSent => "proof-sent",
            HandshakeState::Authenticated => "authenticated",
            HandshakeState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Client side of the login handshake
pub struct AuthenticationHandshake {
    state: HandshakeState,
    nonce_size: usize,
    min_iterations: u32,
    username: String,
    material: Option<PasswordKeyMaterial>,
    client_nonce: Vec<u8>,
    expected_server_proof: Option<Zeroizing<[u8; PROOF_SIZE]>>,
}

impl AuthenticationHandshake {
    /// Create an idle handshake
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: HandshakeState::Idle,
            nonce_size: config.client_nonce_size.max(MIN_CLIENT_NONCE_SIZE),
            min_iterations: config.min_iterations,
            username: String::new(),
            material: None,
            client_nonce: Vec::new(),
            expected_server_proof: None,
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Begin a login attempt
    ///
    /// Allowed from `Idle` or after a previous attempt was `Rejected`.
    pub fn start(&mut self, credential: Credential) -> Result<ChallengeRequest> {
        let mut nonce = vec![0u8; self.nonce_size];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        self.start_with_nonce(credential, nonce)
    }

    pub(crate) fn start_with_nonce(
        &mut self,
        credential: Credential,
        client_nonce: Vec<u8>,
    ) -> Result<ChallengeRequest> {
        if !matches!(self.state, HandshakeState::Idle | HandshakeState::Rejected) {
            return Err(Error::HandshakeState(format!(
                "cannot start a login while {}",
                self.state
            )));
        }
        if client_nonce.len() < MIN_CLIENT_NONCE_SIZE {
            return Err(Error::HandshakeState(format!(
                "client nonce must be at least {} bytes",
                MIN_CLIENT_NONCE_SIZE
            )));
        }

        self.clear();
        let (username, material) = credential.into_parts();
        self.username = username.clone();
        self.material = Some(material);
        self.client_nonce = client_nonce.clone();
        self.state = HandshakeState::ChallengeSent;

        tracing::debug!("Login challenge requested for {}", self.username);
        Ok(ChallengeRequest {
            username,
            nonce: client_nonce,
        })
    }

    /// Answer the server's challenge
    ///
    /// ## Errors
    ///
    /// `ChallengeBinding` if the challenge nonce does not extend the client
    /// nonce, names an unknown algorithm, or asks for fewer iterations than
    /// the configured floor. The handshake is `Rejected` afterwards.
    pub fn respond(&mut self, challenge: AuthChallenge, nickname: &str) -> Result<LoginRequest> {
        if self.state != HandshakeState::ChallengeSent {
            return Err(Error::HandshakeState(format!(
                "unexpected challenge while {}",
                self.state
            )));
        }

        if challenge.nonce.len() <= self.client_nonce.len()
            || !challenge.nonce.starts_with(&self.client_nonce)
        {
            return Err(self.fail(Error::ChallengeBinding(
                "server nonce does not extend the client nonce".into(),
            )));
        }
        if !challenge.password_spec.is_supported() {
            return Err(self.fail(Error::ChallengeBinding(format!(
                "unsupported password algorithm {}",
                challenge.password_spec.algorithm
            ))));
        }
        if challenge.password_spec.iterations < self.min_iterations {
            return Err(self.fail(Error::ChallengeBinding(format!(
                "{} iterations is below the minimum of {}",
                challenge.password_spec.iterations, self.min_iterations
            ))));
        }

        let proofs = match self.material.as_ref() {
            Some(material) => challenge
                .password_spec
                .derive_password_key(material)
                .and_then(|salted| scram::client_proofs(&salted, &challenge.nonce)),
            None => Err(Error::Internal("password material missing".into())),
        };
        let proofs = match proofs {
            Ok(proofs) => proofs,
            Err(e) => return Err(self.fail(e)),
        };

        self.expected_server_proof = Some(proofs.expected_server_proof);
        self.state = HandshakeState::ProofSent;

        Ok(LoginRequest {
            nonce: challenge.nonce,
            proof: proofs.client_proof,
            nickname: nickname.to_string(),
        })
    }

    /// Verify the server's proof and recover the identity keys
    ///
    /// The escrows are only touched after the server proof has matched.
    pub fn complete(
        &mut self,
        result: LoginResult,
    ) -> Result<(SessionCredentials, IdentityKeyBundle)> {
        if self.state != HandshakeState::ProofSent {
            return Err(Error::HandshakeState(format!(
                "unexpected login result while {}",
                self.state
            )));
        }

        let verified = self
            .expected_server_proof
            .take()
            .map(|expected| proofs_match(&expected, &result.proof))
            .unwrap_or(false);
        if !verified {
            return Err(self.fail(Error::ServerAuthentication));
        }

        let keys = match self.material.take() {
            Some(material) => IdentityKeyBundle::unwrap(&result.x25519, &result.ed25519, &material),
            None => Err(Error::Internal("password material missing".into())),
        };
        let keys = match keys {
            Ok(keys) => keys,
            Err(e) => return Err(self.fail(e)),
        };

        let credentials = SessionCredentials {
            username: std::mem::take(&mut self.username),
            session_id: result.session_id,
            server_public_key: result.server_public_key,
            server_name: result.server_name,
            token: result.token,
        };

        self.clear();
        self.state = HandshakeState::Authenticated;
        tracing::info!(
            "Authenticated as {} (session {})",
            credentials.username,
            credentials.session_id
        );
        Ok((credentials, keys))
    }

    /// The server refused the login
    ///
    /// Returns the error to surface to the caller.
    pub fn reject(&mut self, reason: &str) -> Error {
        self.fail(Error::AuthenticationFailed(reason.to_string()))
    }

    /// Forget everything and go back to `Idle`
    pub fn reset(&mut self) {
        self.clear();
        self.state = HandshakeState::Idle;
    }

    /// Whether a login attempt is waiting on the server
    pub fn in_progress(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::ChallengeSent | HandshakeState::ProofSent
        )
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::warn!("Login handshake rejected: {}", error);
        self.clear();
        self.state = HandshakeState::Rejected;
        error
    }

    fn clear(&mut self) {
        self.username.clear();
        self.material = None;
        self.client_nonce.clear();
        self.expected_server_proof = None;
    }
}

impl fmt::Debug for AuthenticationHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationHandshake")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
