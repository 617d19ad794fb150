//! The channel service.
//!
//! [`ChannelService`] is the public API of the engine: membership
//! management (`join`, `quit`), connection tracking (`connect`,
//! `disconnect`), delivery (`push`), and history retrieval (`history`).
//! It owns no state of its own; documents live behind the injected
//! [`MembershipStore`] and delivery goes through the injected [`Router`].
//!
//! Mutations take the affected document's exclusive lease for the whole
//! read-modify-write. Operations touching both collections (`join`,
//! `quit`) run two independent exclusive sections and are not jointly
//! atomic; a crash between them leaves a one-sided membership edge that
//! [`crate::reconcile`] repairs offline.

use crate::channel::{ChannelDoc, ChannelId, PlayerId};
use crate::membership::PlayerChannelDoc;
use crate::message::PushRecord;
use crate::reconcile::ReconcileReport;
use crate::router::{DeliveryOptions, Router};
use crate::store::{MembershipStore, StoreError};
use futures_util::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Default bound on retained persistent messages per channel.
pub const DEFAULT_MAX_MSG_COUNT: usize = 100;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum retained persistent messages per channel. Must be positive.
    pub max_msg_count: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_msg_count: DEFAULT_MAX_MSG_COUNT,
        }
    }
}

/// Error raised by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The operation requires a channel document that does not exist.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),
    /// The operation requires a player membership document that does not
    /// exist.
    #[error("player channel not found: {0}")]
    PlayerChannelNotFound(PlayerId),
    /// The arguments cannot be combined.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The store failed; propagated verbatim.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Document counts across the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Stored channel documents.
    pub channels: usize,
    /// Stored player membership documents.
    pub players: usize,
}

/// The message-distribution engine.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct ChannelService {
    store: Arc<dyn MembershipStore>,
    router: Router,
    config: ServiceConfig,
}

impl ChannelService {
    /// Create a service over `store`, delivering through `router`.
    #[must_use]
    pub fn new(store: Arc<dyn MembershipStore>, router: Router, config: ServiceConfig) -> Self {
        info!(max_msg_count = config.max_msg_count, "Creating channel service");
        Self {
            store,
            router,
            config,
        }
    }

    /// Add `player_id` to `channel_id`, creating the channel on first join.
    ///
    /// Joining again is an upsert: the member's connector id is replaced.
    /// `connector_id` of `None` records the member as offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn join(
        &self,
        channel_id: &str,
        player_id: &str,
        connector_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        let connector_id = connector_id.unwrap_or("");

        let mut lease = self.store.channel_for_update(channel_id).await?;
        if lease.get().is_none() {
            info!(channel = %channel_id, "Creating channel");
        }
        lease
            .entry()
            .get_or_insert_with(|| ChannelDoc::new(channel_id))
            .set_connector(player_id, connector_id);
        lease.save().await?;

        let mut lease = self.store.player_for_update(player_id).await?;
        lease
            .entry()
            .get_or_insert_with(|| PlayerChannelDoc::new(player_id))
            .insert(channel_id);
        lease.save().await?;

        info!(channel = %channel_id, player = %player_id, connector = %connector_id, "Player joined");
        Ok(())
    }

    /// Remove `player_id` from `channel_id`.
    ///
    /// The channel document is deleted when its last member leaves, and the
    /// player's membership document when its last channel is removed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelNotFound`] if the channel does not
    /// exist and [`ChannelError::PlayerChannelNotFound`] if the player has
    /// no membership document.
    pub async fn quit(&self, channel_id: &str, player_id: &str) -> Result<(), ChannelError> {
        let mut lease = self.store.channel_for_update(channel_id).await?;
        let Some(doc) = lease.entry().as_mut() else {
            return Err(ChannelError::ChannelNotFound(channel_id.to_string()));
        };
        doc.remove_player(player_id);
        if doc.is_empty() {
            info!(channel = %channel_id, "Removing empty channel");
            lease.remove().await?;
        } else {
            lease.save().await?;
        }

        let mut lease = self.store.player_for_update(player_id).await?;
        let Some(doc) = lease.entry().as_mut() else {
            return Err(ChannelError::PlayerChannelNotFound(player_id.to_string()));
        };
        doc.remove(channel_id);
        if doc.is_empty() {
            lease.remove().await?;
        } else {
            lease.save().await?;
        }

        info!(channel = %channel_id, player = %player_id, "Player quit");
        Ok(())
    }

    /// Point every channel `player_id` belongs to at `connector_id`.
    ///
    /// A player without memberships is fine; nothing happens. The player's
    /// membership document stays locked while the per-channel updates run,
    /// so a concurrent `join` or `quit` cannot change the set mid-flight.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelNotFound`] if a listed channel is
    /// missing, which signals a membership mirror violation worth a
    /// [`reconcile`](ChannelService::reconcile) run.
    pub async fn connect(
        &self,
        player_id: &str,
        connector_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        let connector_id = connector_id.unwrap_or("");
        self.reattach(player_id, connector_id).await?;
        info!(player = %player_id, connector = %connector_id, "Player connected");
        Ok(())
    }

    /// Mark `player_id` offline in every channel it belongs to.
    ///
    /// # Errors
    ///
    /// Same contract as [`connect`](ChannelService::connect).
    pub async fn disconnect(&self, player_id: &str) -> Result<(), ChannelError> {
        self.reattach(player_id, "").await?;
        info!(player = %player_id, "Player disconnected");
        Ok(())
    }

    async fn reattach(&self, player_id: &str, connector_id: &str) -> Result<(), ChannelError> {
        let lease = self.store.player_for_update(player_id).await?;
        let Some(doc) = lease.get() else {
            return Ok(());
        };
        let channels: Vec<ChannelId> = doc.channels.iter().cloned().collect();

        let updates = channels.iter().map(|channel_id| async move {
            let mut lease = self.store.channel_for_update(channel_id).await?;
            let Some(doc) = lease.entry().as_mut() else {
                return Err(ChannelError::ChannelNotFound(channel_id.clone()));
            };
            doc.set_connector(player_id, connector_id);
            lease.save().await?;
            Ok(())
        });
        // First failure wins and the remaining updates are abandoned; no
        // compensation for updates that already saved.
        try_join_all(updates).await?;
        drop(lease);
        Ok(())
    }

    /// Push a message to the channel's online members.
    ///
    /// With `recipients` the push covers only the named members, otherwise
    /// the whole membership. A persistent push is appended to channel
    /// history under the next sequence number before any delivery; success
    /// reflects persistence only, delivery failures never surface.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelNotFound`] if the channel does not
    /// exist and [`ChannelError::InvalidArgument`] for a persistent push
    /// naming explicit recipients.
    pub async fn push(
        &self,
        channel_id: &str,
        recipients: Option<&[PlayerId]>,
        route: &str,
        payload: Value,
        persistent: bool,
    ) -> Result<(), ChannelError> {
        let targeted = recipients.is_some_and(|r| !r.is_empty());

        let mut lease = self.store.channel_for_update(channel_id).await?;
        let Some(doc) = lease.entry().as_mut() else {
            return Err(ChannelError::ChannelNotFound(channel_id.to_string()));
        };
        if persistent && targeted {
            return Err(ChannelError::InvalidArgument(
                "persistent push cannot name explicit recipients",
            ));
        }

        let record = if persistent {
            doc.append_history(route, payload, self.config.max_msg_count)
        } else {
            PushRecord::new(route, payload)
        };
        let groups = doc.connector_groups(recipients);
        lease.save().await?;

        debug!(
            channel = %channel_id,
            route,
            persistent,
            connectors = groups.len(),
            "Pushing message"
        );
        let options = if targeted {
            DeliveryOptions::targeted()
        } else {
            DeliveryOptions::broadcast()
        };
        self.router.deliver(&groups, route, &record, options).await;
        Ok(())
    }

    /// Read up to `count` retained records of `channel_id` starting at
    /// sequence number `seq`, without locking the channel.
    ///
    /// `seq` defaults to 0 (everything retained) and `count` to the
    /// configured backlog bound. A request reaching before the oldest
    /// retained record starts at the oldest record, but `count` is still
    /// spent from the requested position, so records trimmed from the
    /// backlog count against it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ChannelNotFound`] if the channel does not
    /// exist.
    pub async fn history(
        &self,
        channel_id: &str,
        seq: Option<u64>,
        count: Option<usize>,
    ) -> Result<Vec<PushRecord>, ChannelError> {
        let seq = seq.unwrap_or(0);
        let count = count.unwrap_or(self.config.max_msg_count);

        let Some(doc) = self.store.channel(channel_id).await? else {
            return Err(ChannelError::ChannelNotFound(channel_id.to_string()));
        };
        let records = doc.history_window(seq, count);
        debug!(channel = %channel_id, seq, count, returned = records.len(), "History read");
        Ok(records)
    }

    /// Document counts across the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store scans fail.
    pub async fn stats(&self) -> Result<ServiceStats, ChannelError> {
        let channels = self.store.channel_ids().await?.len();
        let players = self.store.player_ids().await?.len();
        Ok(ServiceStats { channels, players })
    }

    /// Run the membership mirror repair pass over the whole store.
    ///
    /// See [`crate::reconcile`] for what gets repaired and when to run it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails mid-pass.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ChannelError> {
        Ok(crate::reconcile::reconcile(self.store.as_ref()).await?)
    }
}
