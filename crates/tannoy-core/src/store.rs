//! Membership persistence for Tannoy.
//!
//! Every mutation of the two document collections goes through
//! [`MembershipStore`]: an exclusive fetch hands back a [`DocLease`] that
//! pins the document id until the lease is saved, removed, or dropped.
//! Concurrent exclusive fetches of the same id serialize; different ids
//! never contend. Plain reads ([`MembershipStore::channel`],
//! [`MembershipStore::player`]) bypass the locks entirely: they see the
//! last saved state, never a writer's uncommitted working copy.
//!
//! [`MemoryStore`] is the bundled backend: process-local, lease semantics
//! identical to what a database-backed store must provide.

use crate::channel::ChannelDoc;
use crate::membership::PlayerChannelDoc;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed or refused the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Exclusive hold on one document while a read-modify-write is in flight.
///
/// The lease owns a working copy of the document (or its absence) together
/// with the per-id lock. Consuming it with [`save`](DocLease::save) or
/// [`remove`](DocLease::remove) publishes the outcome and releases the
/// lock; dropping it releases the lock and discards any local mutation.
#[async_trait]
pub trait DocLease<T>: Send {
    /// The held value; `None` while the document does not exist. Creating
    /// a document is writing `Some` here and saving.
    fn entry(&mut self) -> &mut Option<T>;

    /// Read-only view of the held value.
    fn get(&self) -> Option<&T>;

    /// Persist the held value and release the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn save(self: Box<Self>) -> StoreResult<()>;

    /// Delete the document and release the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    async fn remove(self: Box<Self>) -> StoreResult<()>;
}

/// Boxed lease over a channel document.
pub type ChannelLease = Box<dyn DocLease<ChannelDoc>>;

/// Boxed lease over a player membership document.
pub type PlayerLease = Box<dyn DocLease<PlayerChannelDoc>>;

/// Persistence contract for the channel and player collections.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Exclusively fetch a channel document for read-modify-write.
    ///
    /// Waits until no other lease on the same id is outstanding.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the fetch.
    async fn channel_for_update(&self, id: &str) -> StoreResult<ChannelLease>;

    /// Exclusively fetch a player membership document for read-modify-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the fetch.
    async fn player_for_update(&self, id: &str) -> StoreResult<PlayerLease>;

    /// Read a channel document without taking its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the read.
    async fn channel(&self, id: &str) -> StoreResult<Option<ChannelDoc>>;

    /// Read a player membership document without taking its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the read.
    async fn player(&self, id: &str) -> StoreResult<Option<PlayerChannelDoc>>;

    /// Ids of every stored channel document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the scan.
    async fn channel_ids(&self) -> StoreResult<Vec<String>>;

    /// Ids of every stored player membership document.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve the scan.
    async fn player_ids(&self) -> StoreResult<Vec<String>>;
}

/// Lock token plus value slot for one document id.
struct Slot<T> {
    lock: Arc<Mutex<()>>,
    value: Option<T>,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            value: None,
        }
    }
}

/// One document collection with per-id exclusive leases.
struct Table<T> {
    slots: Arc<DashMap<String, Slot<T>>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Table<T> {
    async fn lock(&self, id: &str) -> MemoryLease<T> {
        let lock = Arc::clone(
            &self
                .slots
                .entry(id.to_string())
                .or_insert_with(Slot::vacant)
                .lock,
        );
        let guard = lock.lock_owned().await;
        // Re-read after acquisition: the value may have changed while the
        // lease waited on an earlier holder.
        let value = self.slots.get(id).and_then(|slot| slot.value.clone());
        MemoryLease {
            id: id.to_string(),
            value,
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    fn read(&self, id: &str) -> Option<T> {
        self.slots.get(id).and_then(|slot| slot.value.clone())
    }

    fn ids(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| slot.value.is_some())
            .map(|slot| slot.key().clone())
            .collect()
    }
}

/// [`DocLease`] implementation backed by a [`Table`].
struct MemoryLease<T> {
    id: String,
    value: Option<T>,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<DashMap<String, Slot<T>>>,
}

impl<T> MemoryLease<T> {
    /// Publish a value into the slot. The slot cannot vanish while the
    /// guard is held, so a miss here means the lease was already released.
    fn write_back(&self, value: Option<T>) {
        if let Some(mut slot) = self.slots.get_mut(&self.id) {
            slot.value = value;
        }
    }

    /// Release the id lock, then reclaim the slot if it holds no document.
    /// Under the shard lock a strong count of one proves no other lease or
    /// waiter references the slot, so reclamation never splits a lock.
    fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
        }
        self.slots.remove_if(&self.id, |_, slot| {
            slot.value.is_none() && Arc::strong_count(&slot.lock) == 1
        });
    }
}

impl<T> Drop for MemoryLease<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> DocLease<T> for MemoryLease<T> {
    fn entry(&mut self) -> &mut Option<T> {
        &mut self.value
    }

    fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    async fn save(mut self: Box<Self>) -> StoreResult<()> {
        let value = self.value.take();
        self.write_back(value);
        self.release();
        Ok(())
    }

    async fn remove(mut self: Box<Self>) -> StoreResult<()> {
        self.value = None;
        self.write_back(None);
        self.release();
        Ok(())
    }
}

/// In-memory [`MembershipStore`] backend.
///
/// Documents live in process memory. Per-id leases serialize concurrent
/// writers exactly as a database-backed store's exclusive fetch would,
/// which makes this backend suitable for tests and for single-process
/// deployments where durability is not required.
#[derive(Default)]
pub struct MemoryStore {
    channels: Table<ChannelDoc>,
    players: Table<PlayerChannelDoc>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn channel_for_update(&self, id: &str) -> StoreResult<ChannelLease> {
        Ok(Box::new(self.channels.lock(id).await))
    }

    async fn player_for_update(&self, id: &str) -> StoreResult<PlayerLease> {
        Ok(Box::new(self.players.lock(id).await))
    }

    async fn channel(&self, id: &str) -> StoreResult<Option<ChannelDoc>> {
        Ok(self.channels.read(id))
    }

    async fn player(&self, id: &str) -> StoreResult<Option<PlayerChannelDoc>> {
        Ok(self.players.read(id))
    }

    async fn channel_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.channels.ids())
    }

    async fn player_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.players.ids())
    }
}
