//! # Session Module
//!
//! One logged-in connection to a chat server: the handshake, the identity
//! keys it recovers, the channel key ring, and the encrypt/decrypt paths
//! for everything posted afterwards.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SESSION LIFECYCLE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   new ──► on_connected ──► login ──► handle_payload ... ──► Authenticated
//! │                                                                │        │
//! │              ┌─────────────────────────────────────────────────┤        │
//! │              ▼                  ▼                  ▼           ▼        │
//! │        join_channel           post           send_direct   incoming     │
//! │        (derive key,       (mode-gated       (one envelope)  posts and   │
//! │         announce hash)     encryption)                      messages    │
//! │                                                                         │
//! │   logout / on_transport_closed ──► identity keys, channel keys and     │
//! │                                    handshake state wiped first         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method takes `&mut self`, so two protocol steps of one session can
//! never interleave. Independent sessions share nothing.
//!
//! ## Incoming Messages
//!
//! Posts and direct messages that fail to parse, decrypt or verify never
//! reach the caller as text. They are reported as
//! [`SessionEvent::MessageRejected`] and dropped; the session carries on.
//!
//! A server that fails to prove it holds the account verifier is not
//! talked to again: the session clears its secrets and closes the
//! transport.

use std::collections::HashMap;

use crate::auth::{AuthenticationHandshake, Credential, HandshakeState, SessionCredentials};
use crate::channel::{derive_channel_key, ChannelInfo, ChannelKeyRing, ChannelMode};
use crate::config::SessionConfig;
use crate::crypto::{PasswordKeyMaterial, PublicKey};
use crate::error::{Error, Result};
use crate::identity::{IdentityKeyBundle, KeyEscrow};
use crate::messaging::{
    decrypt_channel_envelope, decrypt_envelope, encrypt_for_channel, encrypt_for_recipient,
    encrypt_for_recipients, Recipient,
};
use crate::protocol::{
    ChannelRef, ChatPosted, ClientPacket, DirectMessage, JoinChannel, Member, PostChat,
    SendMessage, ServerPacket, Transaction,
};
use crate::transport::{Directory, Transport};

// ============================================================================
// EVENTS
// ============================================================================

/// A chat that decrypted and verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Channel it was posted to, `None` for direct messages
    pub channel: Option<String>,
    /// Who sent it
    pub sender: Member,
    /// The text
    pub text: String,
    /// Whether it is an emote
    pub emote: bool,
    /// Whether it arrived encrypted
    pub encrypted: bool,
}

/// Something the caller should know about after handling a payload
#[derive(Debug)]
pub enum SessionEvent {
    /// The handshake completed
    Authenticated {
        /// Public session identifier
        session_id: String,
        /// Display name of the server
        server_name: Option<String>,
    },
    /// A channel post
    ChatReceived(ChatMessage),
    /// A direct message
    DirectMessage(ChatMessage),
    /// An incoming message was dropped
    MessageRejected {
        /// Channel, `None` for direct messages
        channel: Option<String>,
        /// Claimed sender
        sender: String,
        /// Why it was dropped
        reason: Error,
    },
    /// The server reported an error outside of a login attempt
    ServerError(String),
    /// Any other packet, passed through untouched
    Packet(ServerPacket),
}

// ============================================================================
// SESSION
// ============================================================================

/// Client session context
pub struct Session<T: Transport, D: Directory> {
    config: SessionConfig,
    transport: T,
    directory: D,
    connected: bool,
    handshake: AuthenticationHandshake,
    credentials: Option<SessionCredentials>,
    identity: Option<IdentityKeyBundle>,
    channels: HashMap<String, ChannelInfo>,
    channel_keys: ChannelKeyRing,
}

impl<T: Transport, D: Directory> Session<T, D> {
    /// Create a session
    pub fn new(config: SessionConfig, transport: T, directory: D) -> Result<Self> {
        config.validate()?;
        let handshake = AuthenticationHandshake::new(&config);
        Ok(Self {
            config,
            transport,
            directory,
            connected: false,
            handshake,
            credentials: None,
            identity: None,
            channels: HashMap::new(),
            channel_keys: ChannelKeyRing::new(),
        })
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    /// The transport is up
    pub fn on_connected(&mut self) {
        self.connected = true;
        tracing::info!("Connected");
    }

    /// The transport went away
    pub fn on_transport_closed(&mut self) {
        self.clear_secrets();
        self.connected = false;
        tracing::info!("Transport closed, session cleared");
    }

    /// Log in
    ///
    /// Sends the challenge request. The rest of the handshake runs inside
    /// [`handle_payload`](Self::handle_payload) as the server answers.
    pub async fn login(&mut self, credential: Credential) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.is_authenticated() {
            return Err(Error::HandshakeState("already authenticated".into()));
        }

        let request = self.handshake.start(credential)?;
        self.send_packet(ClientPacket::Challenge(request)).await
    }

    /// Log out and close the transport
    pub async fn logout(&mut self) -> Result<()> {
        let was_authenticated = self.is_authenticated();
        self.clear_secrets();

        if self.connected {
            if was_authenticated {
                self.send_packet(ClientPacket::Logout).await?;
            }
            self.transport.close().await?;
            self.connected = false;
        }
        tracing::info!("Logged out");
        Ok(())
    }

    /// Drop the connection after the server failed to authenticate
    ///
    /// The handshake stays `Rejected`; a new login needs a new transport.
    async fn abandon_server(&mut self, error: Error) -> Error {
        self.identity = None;
        self.credentials = None;
        self.channel_keys.clear();
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Failed to close transport: {}", e);
        }
        self.connected = false;
        tracing::warn!("Server failed to authenticate, connection closed");
        error
    }

    fn clear_secrets(&mut self) {
        self.identity = None;
        self.credentials = None;
        self.channel_keys.clear();
        self.handshake.reset();
    }

    // ------------------------------------------------------------------------
    // Incoming
    // ------------------------------------------------------------------------

    /// Handle one payload from the server
    ///
    /// Handshake failures are returned as `Err` and leave the handshake
    /// `Rejected`. Message failures become [`SessionEvent::MessageRejected`].
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Result<Vec<SessionEvent>> {
        if payload.len() > self.config.max_message_size {
            return Err(Error::ProtocolError(format!(
                "Payload too large: {} bytes (max {})",
                payload.len(),
                self.config.max_message_size
            )));
        }

        let tx = Transaction::<ServerPacket>::from_bytes(payload)?;
        let mut events = Vec::new();

        if let Some(error) = tx.error {
            if self.handshake.in_progress() {
                return Err(self.handshake.reject(&error));
            }
            tracing::warn!("Server error: {}", error);
            events.push(SessionEvent::ServerError(error));
        }

        for packet in tx.packets {
            self.directory.observe(&packet);
            match packet {
                ServerPacket::ChallengeResponse(challenge) => {
                    let request = self.handshake.respond(challenge, &self.config.nickname)?;
                    self.send_packet(ClientPacket::Login(request)).await?;
                }
                ServerPacket::LoginResponse(result) => {
                    let (credentials, identity) = match self.handshake.complete(result) {
                        Ok(done) => done,
                        Err(Error::ServerAuthentication) => {
                            return Err(self.abandon_server(Error::ServerAuthentication).await)
                        }
                        Err(e) => return Err(e),
                    };
                    events.push(SessionEvent::Authenticated {
                        session_id: credentials.session_id.clone(),
                        server_name: credentials.server_name.clone(),
                    });
                    self.credentials = Some(credentials);
                    self.identity = Some(identity);
                }
                ServerPacket::ChatPosted(post) => events.push(self.open_post(post)),
                ServerPacket::Message(message) => events.push(self.open_direct(message)),
                ServerPacket::Malformed {
                    ident,
                    payload,
                    reason,
                } => {
                    let sender = ServerPacket::raw_sender(&payload).unwrap_or_default();
                    tracing::warn!("Dropped malformed {} from {}: {}", ident, sender, reason);
                    events.push(SessionEvent::MessageRejected {
                        channel: ServerPacket::raw_channel(&payload),
                        sender,
                        reason: Error::DeserializationError(reason),
                    });
                }
                ServerPacket::ChannelListing(listing) => {
                    for info in &listing.channels {
                        self.channels.insert(info.name.clone(), info.clone());
                    }
                    events.push(SessionEvent::Packet(ServerPacket::ChannelListing(listing)));
                }
                ServerPacket::Unrecognized { ident, payload } => {
                    tracing::debug!("Unrecognized packet: {}", ident);
                    events.push(SessionEvent::Packet(ServerPacket::Unrecognized {
                        ident,
                        payload,
                    }));
                }
                other => events.push(SessionEvent::Packet(other)),
            }
        }

        Ok(events)
    }

    fn open_post(&self, post: ChatPosted) -> SessionEvent {
        match self.read_post(&post) {
            Ok((text, encrypted)) => SessionEvent::ChatReceived(ChatMessage {
                channel: Some(post.channel),
                sender: post.user,
                text,
                emote: post.emote,
                encrypted,
            }),
            Err(reason) => {
                tracing::warn!(
                    "Dropped post in {} from {}: {}",
                    post.channel,
                    post.user.ident,
                    reason
                );
                SessionEvent::MessageRejected {
                    channel: Some(post.channel),
                    sender: post.user.ident,
                    reason,
                }
            }
        }
    }

    fn read_post(&self, post: &ChatPosted) -> Result<(String, bool)> {
        if let Some(envelope) = &post.encrypted {
            let identity = self.identity.as_ref().ok_or(Error::NotAuthenticated)?;
            let sender = self.sender_keys(&post.user.ident)?;
            let plaintext = decrypt_envelope(envelope, identity.agreement(), &sender.signing)?;
            return Ok((into_text(plaintext)?, true));
        }

        if let Some(envelope) = &post.sealed {
            let key = self.channel_keys.get(&post.channel).ok_or_else(|| {
                Error::KeyUnavailable(format!("no channel key for {}", post.channel))
            })?;
            let sender = self.sender_keys(&post.user.ident)?;
            let plaintext =
                decrypt_channel_envelope(envelope, key, &post.channel, &sender.signing)?;
            return Ok((into_text(plaintext)?, true));
        }

        if self
            .channel_mode(&post.channel)
            .map_or(false, |mode| mode.is_encrypted())
        {
            return Err(Error::ProtocolError(format!(
                "unencrypted post in encrypted channel {}",
                post.channel
            )));
        }
        let text = post
            .chat
            .clone()
            .ok_or_else(|| Error::ProtocolError("post carries no chat".into()))?;
        Ok((text, false))
    }

    fn open_direct(&self, message: DirectMessage) -> SessionEvent {
        match self.read_direct(&message) {
            Ok((text, encrypted)) => SessionEvent::DirectMessage(ChatMessage {
                channel: None,
                sender: message.sender,
                text,
                emote: false,
                encrypted,
            }),
            Err(reason) => {
                tracing::warn!("Dropped message from {}: {}", message.sender.ident, reason);
                SessionEvent::MessageRejected {
                    channel: None,
                    sender: message.sender.ident,
                    reason,
                }
            }
        }
    }

    fn read_direct(&self, message: &DirectMessage) -> Result<(String, bool)> {
        match &message.encrypted {
            Some(envelope) => {
                let identity = self.identity.as_ref().ok_or(Error::NotAuthenticated)?;
                let sender = self.sender_keys(&message.sender.ident)?;
                let plaintext =
                    decrypt_envelope(envelope, identity.agreement(), &sender.signing)?;
                Ok((into_text(plaintext)?, true))
            }
            None => message
                .message
                .clone()
                .map(|text| (text, false))
                .ok_or_else(|| Error::ProtocolError("message carries no text".into())),
        }
    }

    /// Keys of the claimed sender, from the directory
    fn sender_keys(&self, member_id: &str) -> Result<PublicKey> {
        self.directory
            .member_keys(member_id)
            .ok_or_else(|| Error::KeyUnavailable(format!("no published keys for {}", member_id)))
    }

    // ------------------------------------------------------------------------
    // Outgoing
    // ------------------------------------------------------------------------

    /// Join a channel
    ///
    /// With a password, derives and caches the channel key and announces its
    /// identifying hash. Password-keyed channels require one.
    pub async fn join_channel(&mut self, channel: &str, password: Option<&str>) -> Result<()> {
        let server_public_key = self.require_credentials()?.server_public_key.clone();

        let key_hash = match password {
            Some(password) => {
                let key = derive_channel_key(channel, password, &server_public_key)?;
                let hash = *key.identifying_hash();
                self.channel_keys.insert(channel, key);
                Some(hash)
            }
            None => match self.channel_mode(channel) {
                Some(ChannelMode::PasswordKeyed) => {
                    return Err(Error::KeyUnavailable(format!(
                        "{} requires a channel password",
                        channel
                    )))
                }
                // joining announces nothing; the mode gates what is posted
                Some(_) | None => None,
            },
        };

        tracing::info!("Joining {}", channel);
        self.send_packet(ClientPacket::JoinChannel(JoinChannel {
            channel: channel.to_string(),
            key_hash,
        }))
        .await
    }

    /// Leave a channel and forget its key
    pub async fn leave_channel(&mut self, channel: &str) -> Result<()> {
        self.require_credentials()?;
        self.channel_keys.invalidate(channel);
        self.send_packet(ClientPacket::LeaveChannel(ChannelRef {
            channel: channel.to_string(),
        }))
        .await
    }

    /// Post to a channel
    ///
    /// Returns the members that were skipped because they have no published
    /// keys. Empty for open and password-keyed channels.
    ///
    /// Refused with `ProtocolError` until the channel has been listed, since
    /// its mode is unknown before then.
    pub async fn post(&mut self, channel: &str, text: &str, emote: bool) -> Result<Vec<String>> {
        let identity = self.identity.as_ref().ok_or(Error::NotAuthenticated)?;

        let mut post = PostChat {
            channel: channel.to_string(),
            chat: None,
            encrypted: None,
            sealed: None,
            emote,
        };
        let mut skipped = Vec::new();

        let mode = self.channel_mode(channel).ok_or_else(|| {
            Error::ProtocolError(format!("{} has not been listed yet", channel))
        })?;
        match mode {
            ChannelMode::Open => post.chat = Some(text.to_string()),
            ChannelMode::IdentityKeyed => {
                let recipients: Vec<Recipient> = self
                    .directory
                    .channel_members(channel)
                    .into_iter()
                    .map(|id| {
                        let keys = self.directory.member_keys(&id);
                        Recipient { id, keys }
                    })
                    .collect();

                let set = encrypt_for_recipients(text.as_bytes(), &recipients, identity.signing())?;
                if set.envelopes.is_empty() {
                    return Err(Error::KeyUnavailable(format!(
                        "no member of {} has published keys",
                        channel
                    )));
                }
                skipped = set.skipped;
                post.encrypted = Some(set.envelopes);
            }
            ChannelMode::PasswordKeyed => {
                let key = self.channel_keys.get(channel).ok_or_else(|| {
                    Error::KeyUnavailable(format!("no channel key for {}", channel))
                })?;
                post.sealed = Some(encrypt_for_channel(
                    text.as_bytes(),
                    key,
                    channel,
                    identity.signing(),
                )?);
            }
        }

        self.send_packet(ClientPacket::PostChat(post)).await?;
        Ok(skipped)
    }

    /// Send an encrypted direct message
    pub async fn send_direct(&mut self, recipient: &str, text: &str) -> Result<()> {
        let identity = self.identity.as_ref().ok_or(Error::NotAuthenticated)?;
        let keys = self
            .directory
            .member_keys(recipient)
            .ok_or_else(|| Error::KeyUnavailable(format!("no published keys for {}", recipient)))?;

        let envelope = encrypt_for_recipient(text.as_bytes(), &keys.agreement, identity.signing())?;
        self.send_packet(ClientPacket::SendMessage(SendMessage {
            recipient: recipient.to_string(),
            message: None,
            encrypted: Some(envelope),
        }))
        .await
    }

    /// Ask for the channel list
    pub async fn list_channels(&mut self) -> Result<()> {
        self.send_packet(ClientPacket::ListChannels).await
    }

    /// Ask for the user list
    pub async fn list_users(&mut self) -> Result<()> {
        self.send_packet(ClientPacket::ListUsers).await
    }

    /// Drop the cached key for a channel
    ///
    /// The next password-keyed post or join needs the password again.
    pub fn invalidate_channel_key(&mut self, channel: &str) -> bool {
        self.channel_keys.invalidate(channel)
    }

    /// Escrow the identity keys under a (new) password
    ///
    /// Returns `(x25519, ed25519)` for upload to the server.
    pub fn seal_identity(&self, password: &str) -> Result<(KeyEscrow, KeyEscrow)> {
        let identity = self.identity.as_ref().ok_or(Error::NotAuthenticated)?;
        let material = PasswordKeyMaterial::from_password(password);
        identity.seal(&material, self.config.escrow_iterations)
    }

    async fn send_packet(&mut self, packet: ClientPacket) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if packet.requires_auth() && !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }

        let bytes = Transaction::single(packet).to_bytes()?;
        self.transport.send(bytes).await
    }

    fn require_credentials(&self) -> Result<&SessionCredentials> {
        self.credentials.as_ref().ok_or(Error::NotAuthenticated)
    }

    /// Mode from the last listing, `None` until the channel is listed
    fn channel_mode(&self, channel: &str) -> Option<ChannelMode> {
        self.channels.get(channel).map(ChannelInfo::mode)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Handshake state
    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// Whether the handshake completed and keys are loaded
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.handshake.state() == HandshakeState::Authenticated
    }

    /// Whether the transport is up
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// What the login produced
    pub fn credentials(&self) -> Option<&SessionCredentials> {
        self.credentials.as_ref()
    }

    /// Our published keys
    pub fn public_key(&self) -> Option<PublicKey> {
        self.identity.as_ref().map(IdentityKeyBundle::public_key)
    }

    /// A channel from the last listing
    pub fn channel(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.get(name)
    }

    /// Whether a channel key is cached
    pub fn has_channel_key(&self, channel: &str) -> bool {
        self.channel_keys.contains(channel)
    }

    /// Configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The directory
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn into_text(plaintext: Vec<u8>) -> Result<String> {
    String::from_utf8(plaintext)
        .map_err(|_| Error::InvalidMessageContent("message is not valid UTF-8".into()))
}

// ============================================================================
// TESTS
// ============================================================================
