//! # Handshake Demo
//!
//! Walks through a full login: the client side of the handshake against an
//! in-process verifier playing the server, ending with the identity keys
//! recovered from their escrows.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example handshake_demo
//! ```

use neolith_core::auth::{AuthChallenge, LoginResult, ScramVerifier};
use neolith_core::crypto::{PasswordKeyMaterial, PasswordSpec};
use neolith_core::{AuthenticationHandshake, Credential, IdentityKeyBundle, SessionConfig};

fn main() {
    println!("=== Neolith Core: Login Handshake Demo ===\n");

    let password = "correct horse battery staple";
    let iterations = 10_000;

    // Step 1: What the server stored at signup
    println!("Step 1: Server-side account record (created at signup)...");
    let material = PasswordKeyMaterial::from_password(password);
    let spec = PasswordSpec::pbkdf2_sha256(b"per-account-random-salt".to_vec(), iterations);
    let verifier = ScramVerifier::derive(&material, &spec).expect("verifier");
    let identity = IdentityKeyBundle::generate();
    let (x25519, ed25519) = identity.seal(&material, iterations).expect("seal escrows");
    println!("  stored_key:  {}...", hex::encode(&verifier.stored_key()[..8]));
    println!("  server_key:  {}...", hex::encode(&verifier.server_key()[..8]));
    println!("  identity:    {}", identity.public_key().fingerprint());
    println!("  (the password itself is not stored)");
    println!();

    // Step 2: Client asks for a challenge
    println!("Step 2: Client sends its nonce...");
    let config = SessionConfig {
        min_iterations: iterations,
        escrow_iterations: iterations,
        ..SessionConfig::default()
    };
    let mut handshake = AuthenticationHandshake::new(&config);
    let request = handshake
        .start(Credential::new("alice", password))
        .expect("start");
    println!("  N1 = {}...", hex::encode(&request.nonce[..8]));
    println!("  state: {}", handshake.state());
    println!();

    // Step 3: Server extends the nonce
    println!("Step 3: Server answers with N1 || N2 and the password spec...");
    let mut nonce = request.nonce.clone();
    nonce.extend_from_slice(&[0x42; 16]);
    let challenge = AuthChallenge {
        nonce,
        password_spec: spec.clone(),
        server_name: Some("demo".into()),
    };
    println!("  {} iterations of {}", spec.iterations, spec.algorithm);
    println!();

    // Step 4: Client proves knowledge of the password
    println!("Step 4: Client computes its proof...");
    let login = handshake.respond(challenge, "alice").expect("respond");
    println!("  proof = {}...", hex::encode(&login.proof[..8]));
    println!("  state: {}", handshake.state());
    println!();

    // Step 5: Server checks the proof and proves itself back
    println!("Step 5: Server verifies the client proof...");
    verifier
        .verify_client_proof(&login.nonce, &login.proof)
        .expect("client proof");
    let server_proof = verifier.server_proof(&login.nonce).expect("server proof");
    println!("  client proof accepted");
    println!();

    // Step 6: Client verifies the server and unwraps its keys
    println!("Step 6: Client verifies the server proof and unwraps its keys...");
    let (credentials, recovered) = handshake
        .complete(LoginResult {
            proof: server_proof,
            session_id: "s-demo".into(),
            server_public_key: vec![0u8; 32],
            x25519,
            ed25519,
            server_name: Some("demo".into()),
            token: None,
        })
        .expect("complete");

    println!("  state: {}", handshake.state());
    println!("  session: {}", credentials.session_id);
    println!("  recovered identity: {}", recovered.public_key().fingerprint());
    assert_eq!(recovered.public_key(), identity.public_key());
    println!();

    // Step 7: A wrong password never gets that far
    println!("Step 7: Same exchange with a wrong password...");
    let mut handshake = AuthenticationHandshake::new(&config);
    let request = handshake
        .start(Credential::new("alice", "hunter2"))
        .expect("start");
    let mut nonce = request.nonce;
    nonce.extend_from_slice(&[0x42; 16]);
    let login = handshake
        .respond(
            AuthChallenge {
                nonce,
                password_spec: spec,
                server_name: None,
            },
            "alice",
        )
        .expect("respond");
    match verifier.verify_client_proof(&login.nonce, &login.proof) {
        Ok(()) => println!("  unexpected: proof accepted"),
        Err(e) => {
            let err = handshake.reject(&e.to_string());
            println!("  server refused: {}", err);
            println!("  state: {}", handshake.state());
        }
    }

    println!("\n=== Demo Complete ===");
}
