//! SCRAM key schedule.
//!
//! ```text
//! salted_password  = PBKDF2(password, salt, iterations)
//! client_key       = HMAC(salted_password, "Client Key")
//! server_key       = HMAC(salted_password, "Server Key")
//! stored_key       = SHA-256(client_key)
//! client_signature = HMAC(stored_key, challenge_nonce)
//! client_proof     = client_key XOR client_signature
//! server_proof     = HMAC(server_key, challenge_nonce)
//! ```
//!
//! The combined client+server nonce is the whole auth message. The server
//! keeps only `stored_key` and `server_key`, which is what [`ScramVerifier`]
//! holds.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::crypto::{domain, PasswordDerivedKey, PasswordKeyMaterial, PasswordSpec};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Size of client and server proofs in bytes
pub const PROOF_SIZE: usize = 32;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Zeroizing<[u8; PROOF_SIZE]>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| Error::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);

    let mut out = Zeroizing::new([0u8; PROOF_SIZE]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Compare two proofs in constant time
pub fn proofs_match(a: &[u8; PROOF_SIZE], b: &[u8; PROOF_SIZE]) -> bool {
    a[..].ct_eq(&b[..]).into()
}

/// Proofs computed by the client for one challenge nonce
pub(crate) struct ClientProofs {
    pub client_proof: [u8; PROOF_SIZE],
    pub expected_server_proof: Zeroizing<[u8; PROOF_SIZE]>,
}

/// Run the client side of the key schedule
pub(crate) fn client_proofs(salted: &PasswordDerivedKey, nonce: &[u8]) -> Result<ClientProofs> {
    let client_key = hmac_sha256(salted.as_bytes(), domain::SCRAM_CLIENT_KEY)?;
    let server_key = hmac_sha256(salted.as_bytes(), domain::SCRAM_SERVER_KEY)?;
    let stored_key = Zeroizing::new(<[u8; PROOF_SIZE]>::from(Sha256::digest(*client_key)));

    let client_signature = hmac_sha256(&stored_key[..], nonce)?;
    let mut client_proof = [0u8; PROOF_SIZE];
    for (out, (k, s)) in client_proof
        .iter_mut()
        .zip(client_key.iter().zip(client_signature.iter()))
    {
        *out = k ^ s;
    }

    Ok(ClientProofs {
        client_proof,
        expected_server_proof: hmac_sha256(&server_key[..], nonce)?,
    })
}

/// Server-side verifier for one account
///
/// Derived once at signup from the password and uploaded. Holding it is
/// enough to check logins and to prove the server's identity, but not
/// enough to log in as the user.
#[derive(ZeroizeOnDrop)]
pub struct ScramVerifier {
    stored_key: [u8; PROOF_SIZE],
    server_key: [u8; PROOF_SIZE],
}

impl ScramVerifier {
    /// Derive the verifier for a password under `spec`
    pub fn derive(material: &PasswordKeyMaterial, spec: &PasswordSpec) -> Result<Self> {
        let salted = spec.derive_password_key(material)?;
        let client_key = hmac_sha256(salted.as_bytes(), domain::SCRAM_CLIENT_KEY)?;
        let server_key = hmac_sha256(salted.as_bytes(), domain::SCRAM_SERVER_KEY)?;

        Ok(Self {
            stored_key: Sha256::digest(*client_key).into(),
            server_key: *server_key,
        })
    }

    /// Rebuild from stored values
    pub fn from_keys(stored_key: [u8; PROOF_SIZE], server_key: [u8; PROOF_SIZE]) -> Self {
        Self {
            stored_key,
            server_key,
        }
    }

    /// `SHA-256(client_key)`
    pub fn stored_key(&self) -> &[u8; PROOF_SIZE] {
        &self.stored_key
    }

    /// `HMAC(salted_password, "Server Key")`
    pub fn server_key(&self) -> &[u8; PROOF_SIZE] {
        &self.server_key
    }

    /// Check a client proof against the challenge nonce it answers
    ///
    /// Recovers `client_key` from the proof and compares its hash with the
    /// stored key.
    pub fn verify_client_proof(&self, nonce: &[u8], proof: &[u8; PROOF_SIZE]) -> Result<()> {
        let client_signature = hmac_sha256(&self.stored_key, nonce)?;

        let mut client_key = Zeroizing::new([0u8; PROOF_SIZE]);
        for (out, (p, s)) in client_key
            .iter_mut()
            .zip(proof.iter().zip(client_signature.iter()))
        {
            *out = p ^ s;
        }

        let candidate: [u8; PROOF_SIZE] = Sha256::digest(*client_key).into();
        if proofs_match(&candidate, &self.stored_key) {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed("Login failed.".into()))
        }
    }

    /// The proof the server returns for a nonce
    pub fn server_proof(&self, nonce: &[u8]) -> Result<[u8; PROOF_SIZE]> {
        Ok(*hmac_sha256(&self.server_key, nonce)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_password_key;

    fn spec() -> PasswordSpec {
        PasswordSpec::pbkdf2_sha256(b"NaCl".to_vec(), 1000)
    }

    #[test]
    fn test_client_and_verifier_agree() {
        let material = PasswordKeyMaterial::from_password("secret");
        let verifier = ScramVerifier::derive(&material, &spec()).unwrap();

        let salted = derive_password_key(&material, b"NaCl", 1000).unwrap();
        let nonce = b"client-nonce-server-nonce";
        let proofs = client_proofs(&salted, nonce).unwrap();

        assert!(verifier
            .verify_client_proof(nonce, &proofs.client_proof)
            .is_ok());
        assert_eq!(
            verifier.server_proof(nonce).unwrap(),
            *proofs.expected_server_proof
        );
    }

    #[test]
    fn test_proof_bound_to_nonce() {
        let material = PasswordKeyMaterial::from_password("secret");
        let verifier = ScramVerifier::derive(&material, &spec()).unwrap();

        let salted = derive_password_key(&material, b"NaCl", 1000).unwrap();
        let proofs = client_proofs(&salted, b"nonce-one").unwrap();

        assert!(matches!(
            verifier.verify_client_proof(b"nonce-two", &proofs.client_proof),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_wrong_password_proof_rejected() {
        let verifier =
            ScramVerifier::derive(&PasswordKeyMaterial::from_password("secret"), &spec()).unwrap();

        let wrong = PasswordKeyMaterial::from_password("guess");
        let salted = derive_password_key(&wrong, b"NaCl", 1000).unwrap();
        let proofs = client_proofs(&salted, b"nonce").unwrap();

        assert!(verifier
            .verify_client_proof(b"nonce", &proofs.client_proof)
            .is_err());
        assert_ne!(
            verifier.server_proof(b"nonce").unwrap(),
            *proofs.expected_server_proof
        );
    }

    #[test]
    fn test_proofs_match_constant_time_helper() {
        assert!(proofs_match(&[1u8; 32], &[1u8; 32]));
        assert!(!proofs_match(&[1u8; 32], &[2u8; 32]));
    }

    #[test]
    fn test_from_keys_roundtrip() {
        let material = PasswordKeyMaterial::from_password("secret");
        let verifier = ScramVerifier::derive(&material, &spec()).unwrap();
        let restored = ScramVerifier::from_keys(*verifier.stored_key(), *verifier.server_key());

        assert_eq!(
            restored.server_proof(b"n").unwrap(),
            verifier.server_proof(b"n").unwrap()
        );
    }
}
