//! Member key lookup.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::crypto::PublicKey;
use crate::protocol::{Member, ServerPacket};

/// Source of members' current public keys and channel membership
///
/// The session queries it on every use and keeps no copy of its answers.
pub trait Directory: Send + Sync {
    /// Published keys for a member, if known
    fn member_keys(&self, member_id: &str) -> Option<PublicKey>;

    /// Current members of a channel
    fn channel_members(&self, channel: &str) -> Vec<String>;

    /// Called with every packet the session receives
    ///
    /// Directories fed from elsewhere can ignore it.
    fn observe(&self, _packet: &ServerPacket) {}
}

/// Directory kept current from server listings and join/leave notices
///
/// Keys are only learned from `user.*` and `channel.userlist` /
/// `channel.joined` packets, never from the sender field of a chat.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    members: RwLock<HashMap<String, Member>>,
    channels: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a member
    pub fn upsert_member(&self, member: Member) {
        self.members.write().insert(member.ident.clone(), member);
    }

    /// Forget a member and drop them from every channel
    pub fn remove_member(&self, member_id: &str) {
        self.members.write().remove(member_id);
        for members in self.channels.write().values_mut() {
            members.remove(member_id);
        }
    }

    /// Look up a member
    pub fn member(&self, member_id: &str) -> Option<Member> {
        self.members.read().get(member_id).cloned()
    }

    /// Replace a channel's member list
    pub fn set_channel_members(&self, channel: &str, members: Vec<Member>) {
        let ids = members.iter().map(|m| m.ident.clone()).collect();
        for member in members {
            self.upsert_member(member);
        }
        self.channels.write().insert(channel.to_string(), ids);
    }

    /// Add one member to a channel
    pub fn join_channel(&self, channel: &str, member: Member) {
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .insert(member.ident.clone());
        self.upsert_member(member);
    }

    /// Remove one member from a channel
    pub fn leave_channel(&self, channel: &str, member_id: &str) {
        if let Some(members) = self.channels.write().get_mut(channel) {
            members.remove(member_id);
        }
    }
}

impl Directory for MemoryDirectory {
    fn member_keys(&self, member_id: &str) -> Option<PublicKey> {
        self.members.read().get(member_id)?.public_key()
    }

    fn channel_members(&self, channel: &str) -> Vec<String> {
        self.channels
            .read()
            .get(channel)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn observe(&self, packet: &ServerPacket) {
        match packet {
            ServerPacket::UserListing(listing) => {
                for member in &listing.users {
                    self.upsert_member(member.clone());
                }
            }
            ServerPacket::UserJoined(notice) => self.upsert_member(notice.user.clone()),
            ServerPacket::UserLeft(notice) => self.remove_member(&notice.user.ident),
            ServerPacket::ChannelUsers(users) => {
                self.set_channel_members(&users.channel, users.users.clone())
            }
            ServerPacket::ChannelJoined(notice) => {
                self.join_channel(&notice.channel, notice.user.clone())
            }
            ServerPacket::ChannelLeft(notice) => {
                self.leave_channel(&notice.channel, &notice.user.ident)
            }
            _ => {}
        }
    }
}
