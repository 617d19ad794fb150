//! Membership mirror repair.
//!
//! `join` and `quit` write the channel document and the player membership
//! document in two independent exclusive sections, so a crash between them
//! leaves a one-sided edge: a member whose player document does not mirror
//! the channel, or the reverse. This pass walks both collections and
//! deletes the surviving half of every one-sided edge. `join` writes the
//! channel side first, so an unmirrored channel-side member is a join that
//! never completed and is rolled back; `quit` clears the channel side
//! first, so an unmirrored player-side membership is a quit that never
//! completed and is finished.
//!
//! The pass holds at most one document lock at a time and reads the
//! opposite side while holding it, so it cannot deadlock against live
//! traffic. Run it while the service is quiesced; under traffic it stays
//! safe but may judge an in-flight join or quit as incomplete.

use crate::channel::{ChannelId, PlayerId};
use crate::store::{MembershipStore, StoreResult};
use serde::Serialize;
use tracing::{info, warn};

/// Counts of repairs applied by [`reconcile`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Channel-side members removed because the player did not mirror them.
    pub dropped_members: usize,
    /// Player-side memberships removed because the channel did not mirror
    /// them.
    pub dropped_memberships: usize,
    /// Documents deleted because the repair emptied them.
    pub removed_docs: usize,
}

impl ReconcileReport {
    /// Whether the pass found nothing to repair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_members == 0 && self.dropped_memberships == 0
    }
}

/// Repair one-sided membership edges across the whole store.
///
/// # Errors
///
/// Returns the first store failure; repairs applied up to that point stay
/// applied.
pub async fn reconcile(store: &dyn MembershipStore) -> StoreResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for channel_id in store.channel_ids().await? {
        repair_channel(store, &channel_id, &mut report).await?;
    }
    for player_id in store.player_ids().await? {
        repair_player(store, &player_id, &mut report).await?;
    }

    info!(
        dropped_members = report.dropped_members,
        dropped_memberships = report.dropped_memberships,
        removed_docs = report.removed_docs,
        "Reconcile finished"
    );
    Ok(report)
}

async fn repair_channel(
    store: &dyn MembershipStore,
    channel_id: &str,
    report: &mut ReconcileReport,
) -> StoreResult<()> {
    let mut lease = store.channel_for_update(channel_id).await?;
    let Some(doc) = lease.entry().as_mut() else {
        return Ok(());
    };

    let mut unmirrored: Vec<PlayerId> = Vec::new();
    for player_id in doc.players.keys() {
        let mirrored = store
            .player(player_id)
            .await?
            .is_some_and(|p| p.contains(channel_id));
        if !mirrored {
            unmirrored.push(player_id.clone());
        }
    }
    if unmirrored.is_empty() {
        return Ok(());
    }

    for player_id in &unmirrored {
        doc.remove_player(player_id);
        warn!(channel = %channel_id, player = %player_id, "Dropped unmirrored channel member");
    }
    report.dropped_members += unmirrored.len();
    if doc.is_empty() {
        report.removed_docs += 1;
        lease.remove().await?;
    } else {
        lease.save().await?;
    }
    Ok(())
}

async fn repair_player(
    store: &dyn MembershipStore,
    player_id: &str,
    report: &mut ReconcileReport,
) -> StoreResult<()> {
    let mut lease = store.player_for_update(player_id).await?;
    let Some(doc) = lease.entry().as_mut() else {
        return Ok(());
    };

    let mut unmirrored: Vec<ChannelId> = Vec::new();
    for channel_id in &doc.channels {
        let mirrored = store
            .channel(channel_id)
            .await?
            .is_some_and(|c| c.has_player(player_id));
        if !mirrored {
            unmirrored.push(channel_id.clone());
        }
    }
    if unmirrored.is_empty() {
        return Ok(());
    }

    for channel_id in &unmirrored {
        doc.remove(channel_id);
        warn!(player = %player_id, channel = %channel_id, "Dropped unmirrored player membership");
    }
    report.dropped_memberships += unmirrored.len();
    if doc.is_empty() {
        report.removed_docs += 1;
        lease.remove().await?;
    } else {
        lease.save().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelDoc;
    use crate::membership::PlayerChannelDoc;
    use crate::store::MemoryStore;

    async fn seed_channel(store: &MemoryStore, id: &str, members: &[(&str, &str)]) {
        let mut lease = store.channel_for_update(id).await.unwrap();
        let doc = lease.entry().get_or_insert_with(|| ChannelDoc::new(id));
        for (player, connector) in members {
            doc.set_connector(*player, *connector);
        }
        lease.save().await.unwrap();
    }

    async fn seed_player(store: &MemoryStore, id: &str, channels: &[&str]) {
        let mut lease = store.player_for_update(id).await.unwrap();
        let doc = lease.entry().get_or_insert_with(|| PlayerChannelDoc::new(id));
        for channel in channels {
            doc.insert(*channel);
        }
        lease.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_consistent_store_is_untouched() {
        let store = MemoryStore::new();
        seed_channel(&store, "area:1", &[("p1", "conn-1"), ("p2", "")]).await;
        seed_player(&store, "p1", &["area:1"]).await;
        seed_player(&store, "p2", &["area:1"]).await;

        let report = reconcile(&store).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(store.channel("area:1").await.unwrap().unwrap().member_count(), 2);
        assert!(store.player("p1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_half_written_join_is_rolled_back() {
        let store = MemoryStore::new();
        // The channel side of a join landed; the player side never did.
        seed_channel(&store, "area:1", &[("p1", "conn-1")]).await;

        let report = reconcile(&store).await.unwrap();

        assert_eq!(report.dropped_members, 1);
        assert_eq!(report.removed_docs, 1);
        assert!(store.channel("area:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_half_written_quit_is_completed() {
        let store = MemoryStore::new();
        // The channel side of a quit landed; the player side never did.
        seed_player(&store, "p1", &["area:1"]).await;

        let report = reconcile(&store).await.unwrap();

        assert_eq!(report.dropped_memberships, 1);
        assert_eq!(report.removed_docs, 1);
        assert!(store.player("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repairs_leave_consistent_edges_alone() {
        let store = MemoryStore::new();
        seed_channel(&store, "area:1", &[("p1", "conn-1"), ("p2", "conn-2")]).await;
        seed_player(&store, "p1", &["area:1"]).await;
        // p2 never completed its join; p3 never completed its quit of a
        // channel that is already gone.
        seed_player(&store, "p3", &["area:1", "ghost:1"]).await;
        seed_channel(&store, "area:1", &[("p3", "conn-3")]).await;

        let report = reconcile(&store).await.unwrap();

        // p2's channel-side entry goes, p3's ghost membership goes, the
        // mirrored edges survive.
        assert_eq!(report.dropped_members, 1);
        assert_eq!(report.dropped_memberships, 1);
        assert_eq!(report.removed_docs, 0);

        let channel = store.channel("area:1").await.unwrap().unwrap();
        assert!(channel.has_player("p1"));
        assert!(channel.has_player("p3"));
        assert!(!channel.has_player("p2"));

        let p3 = store.player("p3").await.unwrap().unwrap();
        assert!(p3.contains("area:1"));
        assert!(!p3.contains("ghost:1"));
    }

    #[tokio::test]
    async fn test_report_is_clean_only_without_repairs() {
        assert!(ReconcileReport::default().is_clean());
        assert!(!ReconcileReport {
            dropped_members: 1,
            ..ReconcileReport::default()
        }
        .is_clean());
    }
}
