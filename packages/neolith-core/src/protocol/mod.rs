//! # Protocol Module
//!
//! Packet definitions for the client/server protocol.
//!
//! Packets travel inside transactions: JSON objects keyed by packet ident,
//! each value a single payload or a list of payloads of that kind, next to
//! optional `txid` and `error` entries.
//!
//! ```text
//! {
//!   "txid": "7f3a",
//!   "channel.joined": [ { "channel": "#ops", "user": { ... } } ],
//!   "channel.userlist": { "channel": "#ops", "users": [ ... ] }
//! }
//! ```
//!
//! Both directions are closed enums. A server ident this client does not
//! know becomes [`ServerPacket::Unrecognized`] and is surfaced to the
//! caller instead of being dropped. A chat or direct message that does not
//! parse becomes [`ServerPacket::Malformed`], so one bad message never
//! takes the rest of its transaction down with it.

mod transaction;

pub use transaction::{Packet, Transaction};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AuthChallenge, ChallengeRequest, LoginRequest, LoginResult};
use crate::channel::ChannelInfo;
use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::messaging::{ChannelEnvelope, EncryptedEnvelope};

// ============================================================================
// SHARED TYPES
// ============================================================================

fn default_hostname() -> String {
    "unknown".to_string()
}

fn default_nickname() -> String {
    "unnamed".to_string()
}

/// A logged-in session as the server describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Public session identifier
    pub ident: String,

    /// Account name
    #[serde(default)]
    pub username: String,

    /// Hostname, possibly masked
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Nickname, unique on the server
    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Published X25519 public key
    #[serde(
        default,
        with = "crate::encoding::b64_array_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub x25519: Option<[u8; 32]>,

    /// Published Ed25519 public key
    #[serde(
        default,
        with = "crate::encoding::b64_array_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub ed25519: Option<[u8; 32]>,
}

impl Member {
    /// Both published keys, if the member has them
    pub fn public_key(&self) -> Option<PublicKey> {
        Some(PublicKey::from_bytes(self.x25519?, self.ed25519?))
    }
}

/// Payload for packets that carry no fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Payload naming a single channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel name
    pub channel: String,
}

/// `channel.join`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChannel {
    /// Channel name
    pub channel: String,

    /// Identifying hash of the channel key, for password-keyed channels
    #[serde(
        default,
        with = "crate::encoding::b64_array_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub key_hash: Option<[u8; 32]>,
}

/// `channel.post`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostChat {
    /// Channel name
    pub channel: String,

    /// Plain text, for open channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,

    /// One envelope per member, for identity-keyed channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<BTreeMap<String, EncryptedEnvelope>>,

    /// One envelope under the channel key, for password-keyed channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed: Option<ChannelEnvelope>,

    /// Whether the chat is an emote
    #[serde(default)]
    pub emote: bool,
}

/// `message.send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Recipient session identifier
    pub recipient: String,

    /// Plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Envelope for the recipient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedEnvelope>,
}

/// `user.listing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListing {
    /// Everyone logged in
    #[serde(default)]
    pub users: Vec<Member>,
}

/// `user.joined` and `user.left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNotice {
    /// The session that arrived or left
    pub user: Member,
}

/// `channel.listing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListing {
    /// Channels visible to this session
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

/// `channel.userlist`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUsers {
    /// Channel name
    pub channel: String,

    /// Members of the channel
    #[serde(default)]
    pub users: Vec<Member>,
}

/// `channel.joined` and `channel.left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMemberNotice {
    /// Channel name
    pub channel: String,

    /// The member that joined or left
    pub user: Member,
}

/// `channel.posted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPosted {
    /// Channel name
    pub channel: String,

    /// Plain text, for open channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,

    /// This member's envelope, for identity-keyed channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedEnvelope>,

    /// Shared envelope, for password-keyed channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed: Option<ChannelEnvelope>,

    /// Whether the chat is an emote
    #[serde(default)]
    pub emote: bool,

    /// Who posted
    pub user: Member,
}

/// `message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Who sent it
    pub sender: Member,

    /// Plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Envelope for this member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedEnvelope>,
}

// ============================================================================
// CLIENT PACKETS
// ============================================================================

/// Packets a client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    /// `challenge`
    Challenge(ChallengeRequest),
    /// `login`
    Login(LoginRequest),
    /// `logout`
    Logout,
    /// `user.list`
    ListUsers,
    /// `channel.list`
    ListChannels,
    /// `channel.join`
    JoinChannel(JoinChannel),
    /// `channel.leave`
    LeaveChannel(ChannelRef),
    /// `channel.post`
    PostChat(PostChat),
    /// `message.send`
    SendMessage(SendMessage),
}

impl ClientPacket {
    /// Whether the server only accepts this packet from a logged-in session
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            ClientPacket::Challenge(_) | ClientPacket::Login(_) | ClientPacket::Logout
        )
    }
}

impl Packet for ClientPacket {
    fn ident(&self) -> &str {
        match self {
            ClientPacket::Challenge(_) => "challenge",
            ClientPacket::Login(_) => "login",
            ClientPacket::Logout => "logout",
            ClientPacket::ListUsers => "user.list",
            ClientPacket::ListChannels => "channel.list",
            ClientPacket::JoinChannel(_) => "channel.join",
            ClientPacket::LeaveChannel(_) => "channel.leave",
            ClientPacket::PostChat(_) => "channel.post",
            ClientPacket::SendMessage(_) => "message.send",
        }
    }

    fn to_payload(&self) -> Result<Value> {
        let value = match self {
            ClientPacket::Challenge(p) => serde_json::to_value(p)?,
            ClientPacket::Login(p) => serde_json::to_value(p)?,
            ClientPacket::Logout | ClientPacket::ListUsers | ClientPacket::ListChannels => {
                serde_json::to_value(Empty::default())?
            }
            ClientPacket::JoinChannel(p) => serde_json::to_value(p)?,
            ClientPacket::LeaveChannel(p) => serde_json::to_value(p)?,
            ClientPacket::PostChat(p) => serde_json::to_value(p)?,
            ClientPacket::SendMessage(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    fn from_payload(ident: &str, payload: Value) -> Result<Self> {
        let packet = match ident {
            "challenge" => ClientPacket::Challenge(serde_json::from_value(payload)?),
            "login" => ClientPacket::Login(serde_json::from_value(payload)?),
            "logout" => ClientPacket::Logout,
            "user.list" => ClientPacket::ListUsers,
            "channel.list" => ClientPacket::ListChannels,
            "channel.join" => ClientPacket::JoinChannel(serde_json::from_value(payload)?),
            "channel.leave" => ClientPacket::LeaveChannel(serde_json::from_value(payload)?),
            "channel.post" => ClientPacket::PostChat(serde_json::from_value(payload)?),
            "message.send" => ClientPacket::SendMessage(serde_json::from_value(payload)?),
            other => {
                return Err(Error::ProtocolError(format!(
                    "Unknown client packet: {}",
                    other
                )))
            }
        };
        Ok(packet)
    }
}

// ============================================================================
// SERVER PACKETS
// ============================================================================

/// Packets a server sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// `challenge.response`
    ChallengeResponse(AuthChallenge),
    /// `login.response`
    LoginResponse(LoginResult),
    /// `user.listing`
    UserListing(UserListing),
    /// `user.joined`
    UserJoined(MemberNotice),
    /// `user.left`
    UserLeft(MemberNotice),
    /// `channel.listing`
    ChannelListing(ChannelListing),
    /// `channel.userlist`
    ChannelUsers(ChannelUsers),
    /// `channel.joined`
    ChannelJoined(ChannelMemberNotice),
    /// `channel.left`
    ChannelLeft(ChannelMemberNotice),
    /// `channel.posted`
    ChatPosted(ChatPosted),
    /// `message`
    Message(DirectMessage),
    /// A packet this client does not know
    Unrecognized {
        /// The packet ident
        ident: String,
        /// The raw payload
        payload: Value,
    },
    /// A `channel.posted` or `message` whose payload did not parse
    Malformed {
        /// The packet ident
        ident: String,
        /// The raw payload
        payload: Value,
        /// Parse error
        reason: String,
    },
}

impl ServerPacket {
    /// Whether this ident carries a message from another member
    fn carries_message(ident: &str) -> bool {
        matches!(ident, "channel.posted" | "message")
    }

    /// Channel named by a raw payload, if any
    pub fn raw_channel(payload: &Value) -> Option<String> {
        payload.get("channel")?.as_str().map(str::to_string)
    }

    /// Claimed sender ident of a raw message payload, if any
    pub fn raw_sender(payload: &Value) -> Option<String> {
        payload
            .get("user")
            .or_else(|| payload.get("sender"))?
            .get("ident")?
            .as_str()
            .map(str::to_string)
    }
}

impl Packet for ServerPacket {
    fn ident(&self) -> &str {
        match self {
            ServerPacket::ChallengeResponse(_) => "challenge.response",
            ServerPacket::LoginResponse(_) => "login.response",
            ServerPacket::UserListing(_) => "user.listing",
            ServerPacket::UserJoined(_) => "user.joined",
            ServerPacket::UserLeft(_) => "user.left",
            ServerPacket::ChannelListing(_) => "channel.listing",
            ServerPacket::ChannelUsers(_) => "channel.userlist",
            ServerPacket::ChannelJoined(_) => "channel.joined",
            ServerPacket::ChannelLeft(_) => "channel.left",
            ServerPacket::ChatPosted(_) => "channel.posted",
            ServerPacket::Message(_) => "message",
            ServerPacket::Unrecognized { ident, .. } | ServerPacket::Malformed { ident, .. } => {
                ident
            }
        }
    }

    fn to_payload(&self) -> Result<Value> {
        let value = match self {
            ServerPacket::ChallengeResponse(p) => serde_json::to_value(p)?,
            ServerPacket::LoginResponse(p) => serde_json::to_value(p)?,
            ServerPacket::UserListing(p) => serde_json::to_value(p)?,
            ServerPacket::UserJoined(p) | ServerPacket::UserLeft(p) => serde_json::to_value(p)?,
            ServerPacket::ChannelListing(p) => serde_json::to_value(p)?,
            ServerPacket::ChannelUsers(p) => serde_json::to_value(p)?,
            ServerPacket::ChannelJoined(p) | ServerPacket::ChannelLeft(p) => {
                serde_json::to_value(p)?
            }
            ServerPacket::ChatPosted(p) => serde_json::to_value(p)?,
            ServerPacket::Message(p) => serde_json::to_value(p)?,
            ServerPacket::Unrecognized { payload, .. } | ServerPacket::Malformed { payload, .. } => {
                payload.clone()
            }
        };
        Ok(value)
    }

    fn from_payload(ident: &str, payload: Value) -> Result<Self> {
        if Self::carries_message(ident) {
            let parsed = match ident {
                "channel.posted" => {
                    serde_json::from_value(payload.clone()).map(ServerPacket::ChatPosted)
                }
                _ => serde_json::from_value(payload.clone()).map(ServerPacket::Message),
            };
            return Ok(parsed.unwrap_or_else(|e| {
                tracing::debug!("Malformed {} payload: {}", ident, e);
                ServerPacket::Malformed {
                    ident: ident.to_string(),
                    payload,
                    reason: e.to_string(),
                }
            }));
        }

        let packet = match ident {
            "challenge.response" => ServerPacket::ChallengeResponse(serde_json::from_value(payload)?),
            "login.response" => ServerPacket::LoginResponse(serde_json::from_value(payload)?),
            "user.listing" => ServerPacket::UserListing(serde_json::from_value(payload)?),
            "user.joined" => ServerPacket::UserJoined(serde_json::from_value(payload)?),
            "user.left" => ServerPacket::UserLeft(serde_json::from_value(payload)?),
            "channel.listing" => ServerPacket::ChannelListing(serde_json::from_value(payload)?),
            "channel.userlist" => ServerPacket::ChannelUsers(serde_json::from_value(payload)?),
            "channel.joined" => ServerPacket::ChannelJoined(serde_json::from_value(payload)?),
            "channel.left" => ServerPacket::ChannelLeft(serde_json::from_value(payload)?),
            other => ServerPacket::Unrecognized {
                ident: other.to_string(),
                payload,
            },
        };
        Ok(packet)
    }
}

// ============================================================================
// TESTS
// ============================================================================
