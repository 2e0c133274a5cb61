//! Durable registry of permanently deleted entity IDs.
//!
//! Once an ID is tombstoned it is filtered from every read and every queued
//! replay. Entries are only ever removed by [`TombstoneRegistry::compact`],
//! and only after the remote store confirmed the delete.

use crate::error::SyncResult;
use feedsync_model::{EntityId, EntityKind, Timestamp};
use feedsync_storage::LocalStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Local key holding the serialized registry.
pub const TOMBSTONES_KEY: &str = "__sync/tombstones";

/// One deleted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneEntry {
    /// Deleted ID.
    pub id: EntityId,
    /// Kind of the deleted entity.
    pub kind: EntityKind,
    /// When the delete was issued locally.
    pub deleted_at: Timestamp,
    /// When the remote store acknowledged the delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_confirmed_at: Option<Timestamp>,
}

/// Durable set of deleted IDs backed by a [`LocalStore`] record.
pub struct TombstoneRegistry<L: LocalStore> {
    store: Arc<L>,
    entries: RwLock<BTreeMap<EntityId, TombstoneEntry>>,
    persist: Mutex<()>,
}

impl<L: LocalStore> TombstoneRegistry<L> {
    /// Loads the registry from `store`.
    ///
    /// Unreadable entries are skipped with a warning; a corrupt record starts
    /// an empty registry rather than failing the engine.
    pub async fn load(store: Arc<L>) -> SyncResult<Self> {
        let mut entries = BTreeMap::new();

        if let Some(raw) = store.get(TOMBSTONES_KEY).await? {
            match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(values) => {
                    for value in values {
                        match serde_json::from_value::<TombstoneEntry>(value) {
                            Ok(entry) => {
                                entries.insert(entry.id.clone(), entry);
                            }
                            Err(e) => warn!(error = %e, "skipping unreadable tombstone"),
                        }
                    }
                }
                Err(e) => warn!(error = %e, "tombstone record is corrupt, starting empty"),
            }
        }

        debug!(count = entries.len(), "loaded tombstones");
        Ok(Self {
            store,
            entries: RwLock::new(entries),
            persist: Mutex::new(()),
        })
    }

    /// Tombstones `id`. Returns false if it was already tombstoned.
    pub async fn add(&self, id: EntityId, kind: EntityKind, now: Timestamp) -> SyncResult<bool> {
        self.mutate(|entries| {
            if entries.contains_key(&id) {
                return false;
            }
            entries.insert(
                id.clone(),
                TombstoneEntry {
                    id: id.clone(),
                    kind,
                    deleted_at: now,
                    remote_confirmed_at: None,
                },
            );
            true
        })
        .await
    }

    /// Records that the remote store acknowledged the delete of `id`.
    pub async fn confirm_remote(&self, id: &EntityId, now: Timestamp) -> SyncResult<bool> {
        self.mutate(|entries| match entries.get_mut(id) {
            Some(entry) if entry.remote_confirmed_at.is_none() => {
                entry.remote_confirmed_at = Some(now);
                true
            }
            _ => false,
        })
        .await
    }

    /// Returns true if `id` is tombstoned.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Returns a snapshot of every tombstoned ID.
    pub fn all(&self) -> HashSet<EntityId> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns every entry ordered by ID.
    pub fn entries(&self) -> Vec<TombstoneEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Returns the entry for `id`.
    pub fn get(&self, id: &EntityId) -> Option<TombstoneEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Returns the number of tombstones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been deleted.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the entries [`compact`](Self::compact) would remove.
    pub fn compaction_candidates(&self, retention: Duration, now: Timestamp) -> Vec<TombstoneEntry> {
        let cutoff = now.saturating_sub(retention);
        self.entries
            .read()
            .values()
            .filter(|e| is_expired(e, cutoff))
            .cloned()
            .collect()
    }

    /// Drops remote-confirmed tombstones older than `retention`.
    pub async fn compact(&self, retention: Duration, now: Timestamp) -> SyncResult<Vec<EntityId>> {
        let cutoff = now.saturating_sub(retention);
        let removed = self
            .mutate(|entries| {
                let expired: Vec<EntityId> = entries
                    .values()
                    .filter(|e| is_expired(e, cutoff))
                    .map(|e| e.id.clone())
                    .collect();
                for id in &expired {
                    entries.remove(id);
                }
                expired
            })
            .await?;

        if !removed.is_empty() {
            info!(count = removed.len(), "compacted tombstones");
        }
        Ok(removed)
    }

    /// Applies `f` to a copy of the registry and publishes it once persisted.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<EntityId, TombstoneEntry>) -> T,
    ) -> SyncResult<T> {
        let _guard = self.persist.lock().await;
        let mut next = self.entries.read().clone();
        let result = f(&mut next);
        let raw = serde_json::to_string(&next.values().collect::<Vec<_>>())?;
        self.store.set(TOMBSTONES_KEY, raw).await?;
        *self.entries.write() = next;
        Ok(result)
    }
}

fn is_expired(entry: &TombstoneEntry, cutoff: Timestamp) -> bool {
    entry
        .remote_confirmed_at
        .is_some_and(|confirmed| confirmed <= cutoff && entry.deleted_at <= cutoff)
}
