//! Player-side membership documents.
//!
//! Each player with at least one channel membership owns a document listing
//! those channels. It is the reverse index of [`ChannelDoc::players`] and
//! exists so connect and disconnect can reach every channel a player
//! belongs to without scanning the channel collection.
//!
//! [`ChannelDoc::players`]: crate::channel::ChannelDoc

use crate::channel::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-player mirror of channel membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerChannelDoc {
    /// Player identifier (document id).
    pub id: String,
    /// Channels the player currently belongs to.
    pub channels: HashSet<ChannelId>,
}

impl PlayerChannelDoc {
    /// Create an empty membership document for a player.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channels: HashSet::new(),
        }
    }

    /// Record membership of a channel. Returns `false` if already recorded.
    pub fn insert(&mut self, channel_id: impl Into<ChannelId>) -> bool {
        self.channels.insert(channel_id.into())
    }

    /// Drop membership of a channel. Returns `true` if it was recorded.
    pub fn remove(&mut self, channel_id: &str) -> bool {
        self.channels.remove(channel_id)
    }

    /// Whether the player belongs to a channel.
    #[must_use]
    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.contains(channel_id)
    }

    /// Whether the player belongs to no channels (the document should be
    /// deleted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut doc = PlayerChannelDoc::new("p1");
        assert!(doc.is_empty());

        assert!(doc.insert("area:1"));
        assert!(!doc.insert("area:1"));
        assert!(doc.contains("area:1"));
        assert!(!doc.is_empty());

        assert!(doc.remove("area:1"));
        assert!(!doc.remove("area:1"));
        assert!(doc.is_empty());
    }
}
