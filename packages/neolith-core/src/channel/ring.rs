//! Per-session cache of channel keys.

use std::collections::HashMap;

use super::ChannelKey;

/// Channel keys held by one session, by channel name
///
/// Owned by the session and emptied on logout or transport close.
#[derive(Debug, Default)]
pub struct ChannelKeyRing {
    keys: HashMap<String, ChannelKey>,
}

impl ChannelKeyRing {
    /// Create an empty ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key, returning the one it replaces
    pub fn insert(&mut self, channel: impl Into<String>, key: ChannelKey) -> Option<ChannelKey> {
        self.keys.insert(channel.into(), key)
    }

    /// Look up the key for a channel
    pub fn get(&self, channel: &str) -> Option<&ChannelKey> {
        self.keys.get(channel)
    }

    /// Whether a key is cached for a channel
    pub fn contains(&self, channel: &str) -> bool {
        self.keys.contains_key(channel)
    }

    /// Drop the key for one channel
    pub fn invalidate(&mut self, channel: &str) -> bool {
        let removed = self.keys.remove(channel).is_some();
        if removed {
            tracing::debug!("Invalidated channel key for {}", channel);
        }
        removed
    }

    /// Drop every key
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
