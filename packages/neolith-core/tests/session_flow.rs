//! End-to-end flow between two sessions.
//!
//! The test plays the server: it answers both logins, seats both members in
//! channels and relays what one session posts to the other.

use neolith_core::auth::{AuthChallenge, LoginResult, ScramVerifier};
use neolith_core::channel::ChannelInfo;
use neolith_core::crypto::{PasswordKeyMaterial, PasswordSpec};
use neolith_core::protocol::{
    ChannelListing, ChannelUsers, ChatPosted, ClientPacket, DirectMessage, Member, Packet,
    ServerPacket, Transaction,
};
use neolith_core::transport::{MemoryDirectory, MemoryTransport};
use neolith_core::{
    Credential, IdentityKeyBundle, KeyEscrow, PublicKey, Session, SessionConfig, SessionEvent,
};
use tokio::sync::mpsc;

const ITERATIONS: u32 = 1000;
const SERVER_KEY: [u8; 32] = [0x33; 32];

type TestSession = Session<MemoryTransport, MemoryDirectory>;

struct Account {
    username: &'static str,
    password: &'static str,
    spec: PasswordSpec,
    verifier: ScramVerifier,
    escrows: (KeyEscrow, KeyEscrow),
    public: PublicKey,
}

impl Account {
    fn register(username: &'static str, password: &'static str) -> Self {
        let material = PasswordKeyMaterial::from_password(password);
        let spec = PasswordSpec::pbkdf2_sha256(username.as_bytes().to_vec(), ITERATIONS);
        let verifier = ScramVerifier::derive(&material, &spec).unwrap();
        let identity = IdentityKeyBundle::generate();
        let escrows = identity.seal(&material, ITERATIONS).unwrap();
        Self {
            username,
            password,
            spec,
            verifier,
            escrows,
            public: identity.public_key(),
        }
    }

    fn session_id(&self) -> String {
        format!("s-{}", self.username)
    }

    fn member(&self) -> Member {
        Member {
            ident: self.session_id(),
            username: self.username.into(),
            hostname: "unknown".into(),
            nickname: self.username.into(),
            x25519: Some(self.public.agreement),
            ed25519: Some(self.public.signing),
        }
    }
}

fn to_bytes(packet: ServerPacket) -> Vec<u8> {
    Transaction::single(packet).to_bytes().unwrap()
}

fn sent(rx: &mut mpsc::Receiver<Vec<u8>>) -> ClientPacket {
    let bytes = rx.try_recv().expect("nothing was sent");
    let mut tx = Transaction::<ClientPacket>::from_bytes(&bytes).unwrap();
    tx.packets.remove(0)
}

async fn connect_and_login(account: &Account) -> (TestSession, mpsc::Receiver<Vec<u8>>) {
    let config = SessionConfig {
        nickname: account.username.into(),
        min_iterations: ITERATIONS,
        escrow_iterations: ITERATIONS,
        ..SessionConfig::default()
    };
    let (transport, mut rx) = MemoryTransport::new();
    let mut session = Session::new(config, transport, MemoryDirectory::new()).unwrap();
    session.on_connected();

    session
        .login(Credential::new(account.username, account.password))
        .await
        .unwrap();
    let ClientPacket::Challenge(request) = sent(&mut rx) else {
        panic!("expected challenge");
    };
    assert_eq!(request.username, account.username);

    let mut nonce = request.nonce;
    nonce.extend_from_slice(b"server-nonce-part");
    session
        .handle_payload(&to_bytes(ServerPacket::ChallengeResponse(AuthChallenge {
            nonce,
            password_spec: account.spec.clone(),
            server_name: Some("flow".into()),
        })))
        .await
        .unwrap();

    let ClientPacket::Login(login) = sent(&mut rx) else {
        panic!("expected login");
    };
    account
        .verifier
        .verify_client_proof(&login.nonce, &login.proof)
        .unwrap();

    let events = session
        .handle_payload(&to_bytes(ServerPacket::LoginResponse(LoginResult {
            proof: account.verifier.server_proof(&login.nonce).unwrap(),
            session_id: account.session_id(),
            server_public_key: SERVER_KEY.to_vec(),
            x25519: account.escrows.0.clone(),
            ed25519: account.escrows.1.clone(),
            server_name: Some("flow".into()),
            token: Some("web-token".into()),
        })))
        .await
        .unwrap();
    assert!(matches!(events.as_slice(), [SessionEvent::Authenticated { .. }]));

    (session, rx)
}

/// Send the same listing and member list to every session
async fn seat(sessions: &mut [&mut TestSession], info: ChannelInfo, members: Vec<Member>) {
    let mut tx = Transaction::new();
    tx.push(ServerPacket::ChannelListing(ChannelListing {
        channels: vec![info.clone()],
    }));
    tx.push(ServerPacket::ChannelUsers(ChannelUsers {
        channel: info.name.clone(),
        users: members,
    }));
    let bytes = tx.to_bytes().unwrap();

    for session in sessions.iter_mut() {
        session.handle_payload(&bytes).await.unwrap();
    }
}

fn received_text(events: Vec<SessionEvent>) -> String {
    match events.into_iter().next() {
        Some(SessionEvent::ChatReceived(chat)) | Some(SessionEvent::DirectMessage(chat)) => chat.text,
        other => panic!("expected a chat, got {:?}", other),
    }
}

#[test]
fn test_identity_keyed_channel_between_sessions() {
    tokio_test::block_on(async {
        let alice = Account::register("alice", "alice-password");
        let bob = Account::register("bob", "bob-password");
        let (mut alice_session, mut alice_rx) = connect_and_login(&alice).await;
        let (mut bob_session, _bob_rx) = connect_and_login(&bob).await;

        let info = ChannelInfo {
            encrypted: true,
            ..ChannelInfo::open("#sec")
        };
        seat(
            &mut [&mut alice_session, &mut bob_session],
            info,
            vec![alice.member(), bob.member()],
        )
        .await;

        alice_session.post("#sec", "meet at noon", false).await.unwrap();
        let ClientPacket::PostChat(post) = sent(&mut alice_rx) else {
            panic!("expected post");
        };

        // the server hands bob only their own envelope
        let mut envelopes = post.encrypted.unwrap();
        let relayed = ChatPosted {
            channel: post.channel,
            chat: None,
            encrypted: envelopes.remove(&bob.session_id()),
            sealed: None,
            emote: post.emote,
            user: alice.member(),
        };
        let events = bob_session
            .handle_payload(&to_bytes(ServerPacket::ChatPosted(relayed)))
            .await
            .unwrap();

        assert_eq!(received_text(events), "meet at noon");
    });
}

#[test]
fn test_password_keyed_channel_between_sessions() {
    tokio_test::block_on(async {
        let alice = Account::register("alice", "alice-password");
        let bob = Account::register("bob", "bob-password");
        let (mut alice_session, mut alice_rx) = connect_and_login(&alice).await;
        let (mut bob_session, mut bob_rx) = connect_and_login(&bob).await;

        let info = ChannelInfo {
            encrypted: true,
            password_protected: true,
            ..ChannelInfo::open("#vault")
        };
        seat(
            &mut [&mut alice_session, &mut bob_session],
            info,
            vec![alice.member(), bob.member()],
        )
        .await;

        alice_session.join_channel("#vault", Some("shared secret")).await.unwrap();
        bob_session.join_channel("#vault", Some("shared secret")).await.unwrap();

        // the server can check both members hold the same key
        let ClientPacket::JoinChannel(alice_join) = sent(&mut alice_rx) else {
            panic!("expected join");
        };
        let ClientPacket::JoinChannel(bob_join) = sent(&mut bob_rx) else {
            panic!("expected join");
        };
        assert!(alice_join.key_hash.is_some());
        assert_eq!(alice_join.key_hash, bob_join.key_hash);

        bob_session.post("#vault", "it's 0451", false).await.unwrap();
        let ClientPacket::PostChat(post) = sent(&mut bob_rx) else {
            panic!("expected post");
        };
        let relayed = ChatPosted {
            channel: post.channel,
            chat: None,
            encrypted: None,
            sealed: post.sealed,
            emote: false,
            user: bob.member(),
        };
        let events = alice_session
            .handle_payload(&to_bytes(ServerPacket::ChatPosted(relayed)))
            .await
            .unwrap();

        assert_eq!(received_text(events), "it's 0451");
    });
}

#[test]
fn test_direct_message_between_sessions() {
    tokio_test::block_on(async {
        let alice = Account::register("alice", "alice-password");
        let bob = Account::register("bob", "bob-password");
        let (mut alice_session, mut alice_rx) = connect_and_login(&alice).await;
        let (mut bob_session, _bob_rx) = connect_and_login(&bob).await;

        let mut listing = Transaction::new();
        listing.push(ServerPacket::UserListing(neolith_core::protocol::UserListing {
            users: vec![alice.member(), bob.member()],
        }));
        let bytes = listing.to_bytes().unwrap();
        alice_session.handle_payload(&bytes).await.unwrap();
        bob_session.handle_payload(&bytes).await.unwrap();

        alice_session.send_direct(&bob.session_id(), "lunch?").await.unwrap();
        let ClientPacket::SendMessage(message) = sent(&mut alice_rx) else {
            panic!("expected message");
        };
        assert_eq!(ClientPacket::SendMessage(message.clone()).ident(), "message.send");

        let events = bob_session
            .handle_payload(&to_bytes(ServerPacket::Message(DirectMessage {
                sender: alice.member(),
                message: None,
                encrypted: message.encrypted,
            })))
            .await
            .unwrap();

        assert_eq!(received_text(events), "lunch?");
    });
}

#[test]
fn test_logout_then_login_again() {
    tokio_test::block_on(async {
        let alice = Account::register("alice", "alice-password");
        let (mut session, _rx) = connect_and_login(&alice).await;
        assert!(session.is_authenticated());
        assert_eq!(session.credentials().unwrap().token.as_deref(), Some("web-token"));

        session.logout().await.unwrap();
        assert!(!session.is_authenticated());
        assert!(session.public_key().is_none());

        // a fresh connection and login gives back the same identity
        let (session, _rx) = connect_and_login(&alice).await;
        assert_eq!(session.public_key(), Some(alice.public));
    });
}
