//! Channel documents for Tannoy.
//!
//! A channel is a named group of players. The document tracks, per member,
//! the id of the connector process currently serving that player (empty
//! string while the player is offline), plus a bounded backlog of persistent
//! messages and the sequence number the next persistent push will take.

use crate::message::PushRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// A channel identifier.
pub type ChannelId = String;

/// A player identifier.
pub type PlayerId = String;

/// A connector process identifier.
pub type ConnectorId = String;

/// Marker connector id for members that are not currently online.
pub const OFFLINE: &str = "";

/// Online recipients of one push, grouped by the connector serving them.
pub type ConnectorGroups = HashMap<ConnectorId, Vec<PlayerId>>;

/// Persistent state of one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDoc {
    /// Channel identifier (document id).
    pub id: ChannelId,
    /// Member player id to the connector currently serving it.
    /// [`OFFLINE`] while the member has no live connection.
    pub players: HashMap<PlayerId, ConnectorId>,
    /// Backlog of persistent messages, oldest first.
    pub msgs: VecDeque<PushRecord>,
    /// Sequence number the next persistent push will be assigned.
    pub seq: u64,
}

impl ChannelDoc {
    /// Create an empty channel document.
    #[must_use]
    pub fn new(id: impl Into<ChannelId>) -> Self {
        Self {
            id: id.into(),
            players: HashMap::new(),
            msgs: VecDeque::new(),
            seq: 0,
        }
    }

    /// Point `player_id` at `connector_id`, adding the member if absent.
    ///
    /// Pass [`OFFLINE`] to mark the member as having no live connection.
    pub fn set_connector(&mut self, player_id: impl Into<PlayerId>, connector_id: impl Into<ConnectorId>) {
        self.players.insert(player_id.into(), connector_id.into());
    }

    /// Remove a member. Returns `true` if the player was a member.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        self.players.remove(player_id).is_some()
    }

    /// Whether the player is a member of this channel.
    #[must_use]
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// Number of members, online or not.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.players.len()
    }

    /// Whether the channel has no members (the document should be deleted).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Append a persistent record, assigning it the current sequence number
    /// and advancing the counter. When the backlog grows past `max`, the
    /// oldest `max / 2` records are dropped in one step.
    ///
    /// Returns the stored record so the caller can deliver the same bytes
    /// it persisted.
    pub fn append_history(&mut self, route: impl Into<String>, msg: Value, max: usize) -> PushRecord {
        let record = PushRecord::new(route, msg).with_seq(self.seq);
        self.msgs.push_back(record.clone());
        self.seq += 1;
        if self.msgs.len() > max {
            self.msgs.drain(..max / 2);
        }
        record
    }

    /// Read up to `count` retained records starting at sequence number `seq`.
    ///
    /// The offset of `seq` inside the backlog is recovered from the channel's
    /// next sequence number and the backlog length. A window reaching before
    /// the oldest retained record starts at the oldest record but still spends
    /// `count` from the requested position, so a small `count` can be consumed
    /// entirely by the missing prefix; a window past the newest record is
    /// empty. Records are returned oldest first.
    #[must_use]
    pub fn history_window(&self, seq: u64, count: usize) -> Vec<PushRecord> {
        let len = i128::from(self.msgs.len() as u64);
        let start = i128::from(seq) - i128::from(self.seq) + len;
        let end = start.saturating_add(i128::from(count as u64));
        let start = start.clamp(0, len) as usize;
        let end = end.clamp(0, len) as usize;
        self.msgs.range(start..end).cloned().collect()
    }

    /// Group the online recipients of a push by connector.
    ///
    /// With `recipients` the grouping covers only the named players that are
    /// members; without it, the whole membership. Offline members are
    /// skipped either way.
    #[must_use]
    pub fn connector_groups(&self, recipients: Option<&[PlayerId]>) -> ConnectorGroups {
        let mut groups = ConnectorGroups::new();
        match recipients {
            Some(players) => {
                for player_id in players {
                    if let Some(connector_id) = self.players.get(player_id) {
                        if connector_id != OFFLINE {
                            groups
                                .entry(connector_id.clone())
                                .or_default()
                                .push(player_id.clone());
                        }
                    }
                }
            }
            None => {
                for (player_id, connector_id) in &self.players {
                    if connector_id != OFFLINE {
                        groups
                            .entry(connector_id.clone())
                            .or_default()
                            .push(player_id.clone());
                    }
                }
            }
        }
        groups
    }
}
