//! Durable queue of remote operations that have not been acknowledged.
//!
//! The queue holds at most one entry per entity ID. Enqueuing for an ID that
//! is already queued replaces its operation in place, so replay always sends
//! the latest state and never an intermediate one.

use crate::error::SyncResult;
use feedsync_model::{EntityId, EntityKind, Timestamp};
use feedsync_storage::LocalStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Local key holding the serialized queue.
pub const PENDING_KEY: &str = "__sync/pending";

/// A remote operation waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingOp {
    /// Write `payload` at the entity's remote path.
    Put {
        /// Encoded entity snapshot.
        payload: Value,
    },
    /// Delete the entity's remote path.
    Delete,
}

impl PendingOp {
    /// Returns true for delete markers.
    pub fn is_delete(&self) -> bool {
        matches!(self, PendingOp::Delete)
    }
}

/// One queued operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    /// Target entity.
    pub id: EntityId,
    /// Kind of the target entity.
    pub kind: EntityKind,
    /// Operation to replay.
    pub op: PendingOp,
    /// Bumped on every enqueue for this ID.
    pub seq: u64,
    /// When the current operation was enqueued.
    pub enqueued_at: Timestamp,
    /// Failed replay attempts of the current operation.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueState {
    next_seq: u64,
    entries: Vec<PendingEntry>,
}

impl QueueState {
    fn position(&self, id: &EntityId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }
}

/// Insertion-ordered, coalescing queue backed by a [`LocalStore`] record.
pub struct PendingWriteQueue<L: LocalStore> {
    store: Arc<L>,
    state: RwLock<QueueState>,
    persist: Mutex<()>,
}

impl<L: LocalStore> PendingWriteQueue<L> {
    /// Loads the queue from `store`. A corrupt record starts an empty queue.
    pub async fn load(store: Arc<L>) -> SyncResult<Self> {
        let state = match store.get(PENDING_KEY).await? {
            Some(raw) => serde_json::from_str::<QueueState>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "pending queue record is corrupt, starting empty");
                QueueState::default()
            }),
            None => QueueState::default(),
        };

        debug!(count = state.entries.len(), "loaded pending queue");
        Ok(Self {
            store,
            state: RwLock::new(state),
            persist: Mutex::new(()),
        })
    }

    /// Queues `op` for `id`, replacing any earlier operation for that ID.
    ///
    /// Returns the entry's new sequence number.
    pub async fn enqueue(
        &self,
        id: EntityId,
        kind: EntityKind,
        op: PendingOp,
        now: Timestamp,
    ) -> SyncResult<u64> {
        self.mutate(|state| {
            state.next_seq += 1;
            let seq = state.next_seq;
            match state.position(&id) {
                Some(index) => {
                    let entry = &mut state.entries[index];
                    entry.kind = kind;
                    entry.op = op;
                    entry.seq = seq;
                    entry.enqueued_at = now;
                    entry.attempts = 0;
                }
                None => state.entries.push(PendingEntry {
                    id,
                    kind,
                    op,
                    seq,
                    enqueued_at: now,
                    attempts: 0,
                }),
            }
            seq
        })
        .await
    }

    /// Returns every entry in replay order.
    ///
    /// Entries stay queued until [`remove`](Self::remove) or
    /// [`remove_if_current`](Self::remove_if_current) confirms them.
    pub fn drain(&self) -> Vec<PendingEntry> {
        self.state.read().entries.clone()
    }

    /// Removes the entry for `id`, whatever its sequence.
    pub async fn remove(&self, id: &EntityId) -> SyncResult<Option<PendingEntry>> {
        if !self.contains(id) {
            return Ok(None);
        }
        self.mutate(|state| state.position(id).map(|index| state.entries.remove(index)))
            .await
    }

    /// Removes the entry for `id` only if it still carries `seq`.
    ///
    /// A newer enqueue for the same ID makes this a no-op.
    pub async fn remove_if_current(&self, id: &EntityId, seq: u64) -> SyncResult<bool> {
        if self.current_seq(id) != Some(seq) {
            return Ok(false);
        }
        self.mutate(|state| match state.position(id) {
            Some(index) if state.entries[index].seq == seq => {
                state.entries.remove(index);
                true
            }
            _ => false,
        })
        .await
    }

    /// Counts a failed replay of the entry for `id` at `seq`.
    pub async fn record_failure(&self, id: &EntityId, seq: u64) -> SyncResult<()> {
        self.mutate(|state| {
            if let Some(entry) = state.entries.iter_mut().find(|e| &e.id == id && e.seq == seq) {
                entry.attempts = entry.attempts.saturating_add(1);
            }
        })
        .await
    }

    /// Returns the sequence currently queued for `id`.
    pub fn current_seq(&self, id: &EntityId) -> Option<u64> {
        self.state
            .read()
            .entries
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.seq)
    }

    /// Returns the entry for `id`.
    pub fn get(&self, id: &EntityId) -> Option<PendingEntry> {
        self.state.read().entries.iter().find(|e| &e.id == id).cloned()
    }

    /// Returns true if an operation is queued for `id`.
    pub fn contains(&self, id: &EntityId) -> bool {
        self.state.read().position(id).is_some()
    }

    /// Returns the number of queued entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Applies `f` to a copy of the queue and publishes it once persisted.
    async fn mutate<T>(&self, f: impl FnOnce(&mut QueueState) -> T) -> SyncResult<T> {
        let _guard = self.persist.lock().await;
        let mut next = self.state.read().clone();
        let result = f(&mut next);
        self.store
            .set(PENDING_KEY, serde_json::to_string(&next)?)
            .await?;
        *self.state.write() = next;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_storage::InMemoryLocalStore;
    use serde_json::json;

    async fn queue() -> (Arc<InMemoryLocalStore>, PendingWriteQueue<InMemoryLocalStore>) {
        let store = Arc::new(InMemoryLocalStore::new());
        let queue = PendingWriteQueue::load(Arc::clone(&store)).await.unwrap();
        (store, queue)
    }

    fn put(n: i64) -> PendingOp {
        PendingOp::Put {
            payload: json!({ "n": n }),
        }
    }

    fn ids(queue: &PendingWriteQueue<InMemoryLocalStore>) -> Vec<String> {
        queue.drain().into_iter().map(|e| e.id.to_string()).collect()
    }

    #[tokio::test]
    async fn drain_preserves_insertion_order() {
        let (_, queue) = queue().await;
        for id in ["c", "a", "b"] {
            queue.enqueue(id.into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        }
        assert_eq!(ids(&queue), vec!["c", "a", "b"]);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn enqueue_coalesces_in_place() {
        let (_, queue) = queue().await;
        queue.enqueue("a".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        queue.enqueue("b".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        queue.enqueue("a".into(), EntityKind::Post, put(2), Timestamp(2)).await.unwrap();

        assert_eq!(ids(&queue), vec!["a", "b"]);
        assert_eq!(queue.get(&"a".into()).unwrap().op, put(2));
    }

    #[tokio::test]
    async fn delete_supersedes_put() {
        let (_, queue) = queue().await;
        queue.enqueue("a".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        queue.enqueue("a".into(), EntityKind::Post, PendingOp::Delete, Timestamp(2)).await.unwrap();

        let entries = queue.drain();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].op.is_delete());
    }

    #[tokio::test]
    async fn stale_sequence_does_not_remove_newer_write() {
        let (_, queue) = queue().await;
        let first = queue.enqueue("a".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        let second = queue.enqueue("a".into(), EntityKind::Post, put(2), Timestamp(2)).await.unwrap();

        assert!(!queue.remove_if_current(&"a".into(), first).await.unwrap());
        assert!(queue.contains(&"a".into()));
        assert!(queue.remove_if_current(&"a".into(), second).await.unwrap());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn failures_are_counted_per_operation() {
        let (_, queue) = queue().await;
        let seq = queue.enqueue("a".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();
        queue.record_failure(&"a".into(), seq).await.unwrap();
        queue.record_failure(&"a".into(), seq).await.unwrap();
        assert_eq!(queue.get(&"a".into()).unwrap().attempts, 2);

        queue.enqueue("a".into(), EntityKind::Post, put(2), Timestamp(2)).await.unwrap();
        assert_eq!(queue.get(&"a".into()).unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn queue_survives_reload() {
        let (store, queue) = queue().await;
        queue.enqueue("a".into(), EntityKind::Comment, put(1), Timestamp(1)).await.unwrap();
        queue.enqueue("b".into(), EntityKind::Post, PendingOp::Delete, Timestamp(1)).await.unwrap();
        drop(queue);

        let reloaded = PendingWriteQueue::load(store).await.unwrap();
        assert_eq!(ids(&reloaded), vec!["a", "b"]);
        let next = reloaded.enqueue("c".into(), EntityKind::Post, put(1), Timestamp(2)).await.unwrap();
        assert_eq!(next, 3);
    }

    #[tokio::test]
    async fn failed_persist_leaves_queue_unchanged() {
        let (store, queue) = queue().await;
        let seq = queue.enqueue("a".into(), EntityKind::Post, put(1), Timestamp(1)).await.unwrap();

        store.set_fail_writes(true);
        assert!(queue.enqueue("a".into(), EntityKind::Post, put(2), Timestamp(2)).await.is_err());
        assert!(queue.enqueue("b".into(), EntityKind::Post, put(1), Timestamp(2)).await.is_err());
        assert!(queue.remove_if_current(&"a".into(), seq).await.is_err());

        assert_eq!(ids(&queue), vec!["a"]);
        assert_eq!(queue.get(&"a".into()).unwrap().op, put(1));
        assert_eq!(queue.current_seq(&"a".into()), Some(seq));

        store.set_fail_writes(false);
        let next = queue.enqueue("b".into(), EntityKind::Post, put(1), Timestamp(3)).await.unwrap();
        assert_eq!(next, seq + 1);
    }

    #[tokio::test]
    async fn remove_missing_is_a_no_op() {
        let (store, queue) = queue().await;
        assert_eq!(queue.remove(&"nope".into()).await.unwrap(), None);
        assert!(store.get(PENDING_KEY).await.unwrap().is_none());
    }
}
