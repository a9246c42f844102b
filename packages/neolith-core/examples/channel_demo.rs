//! # Channel Demo
//!
//! Shows both encrypted channel modes: one envelope per member under
//! ephemeral key agreement, and one envelope under a password-derived
//! channel key.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example channel_demo
//! ```

use neolith_core::crypto::sign;
use neolith_core::messaging::{
    decrypt_channel_envelope, decrypt_envelope, encrypt_for_channel, encrypt_for_recipients,
    Recipient,
};
use neolith_core::{derive_channel_key, IdentityKeyBundle};

fn main() {
    println!("=== Neolith Core: Encrypted Channel Demo ===\n");

    let alice = IdentityKeyBundle::generate();
    let bob = IdentityKeyBundle::generate();
    let carol = IdentityKeyBundle::generate();
    println!("Members:");
    println!("  alice {}", alice.public_key().fingerprint());
    println!("  bob   {}", bob.public_key().fingerprint());
    println!("  carol {}", carol.public_key().fingerprint());
    println!("  dave  (no published keys)");
    println!();

    // Identity-keyed: one envelope per member
    println!("Identity-keyed post from alice...");
    let recipients = vec![
        Recipient::new("bob", bob.public_key()),
        Recipient::new("carol", carol.public_key()),
        Recipient {
            id: "dave".into(),
            keys: None,
        },
    ];
    let set = encrypt_for_recipients(b"standup moved to 10:30", &recipients, alice.signing())
        .expect("encrypt");

    for (id, envelope) in &set.envelopes {
        println!(
            "  {:<6} ephemeral {}...  nonce {}...",
            id,
            hex::encode(&envelope.ephemeral_public_key[..6]),
            hex::encode(&envelope.nonce.as_bytes()[..6])
        );
    }
    println!("  skipped: {:?}", set.skipped);

    let text = decrypt_envelope(
        &set.envelopes["bob"],
        bob.agreement(),
        &alice.signing().public_bytes(),
    )
    .expect("bob decrypts");
    println!("  bob reads: {}", String::from_utf8_lossy(&text));

    let mut forged = set.envelopes["carol"].clone();
    forged.signature = sign(bob.signing(), b"standup moved to 10:30");
    match decrypt_envelope(&forged, carol.agreement(), &alice.signing().public_bytes()) {
        Ok(_) => println!("  unexpected: forged envelope accepted"),
        Err(e) => println!("  re-signed by bob, claimed as alice: {}", e),
    }
    println!();

    // Password-keyed: one envelope under the shared key
    println!("Password-keyed channel #vault...");
    let server_public_key = [0x11u8; 32];
    let alice_key = derive_channel_key("#vault", "open sesame", &server_public_key).expect("key");
    let bob_key = derive_channel_key("#vault", "open sesame", &server_public_key).expect("key");
    let wrong_key = derive_channel_key("#vault", "open says me", &server_public_key).expect("key");

    println!("  alice key hash {}", hex::encode(alice_key.identifying_hash()));
    println!("  bob key hash   {}", hex::encode(bob_key.identifying_hash()));
    println!("  wrong password {}", hex::encode(wrong_key.identifying_hash()));

    let envelope =
        encrypt_for_channel(b"vault code 0451", &alice_key, "#vault", alice.signing())
            .expect("encrypt");
    let text = decrypt_channel_envelope(
        &envelope,
        &bob_key,
        "#vault",
        &alice.signing().public_bytes(),
    )
    .expect("bob decrypts");
    println!("  bob reads: {}", String::from_utf8_lossy(&text));

    match decrypt_channel_envelope(
        &envelope,
        &wrong_key,
        "#vault",
        &alice.signing().public_bytes(),
    ) {
        Ok(_) => println!("  unexpected: wrong key decrypted"),
        Err(e) => println!("  wrong password: {}", e),
    }

    println!("\n=== Demo Complete ===");
}
