//! Remote store abstraction.
//!
//! The remote store is a path-addressed JSON tree. Reading a parent path
//! returns an object of its children, so `read_path("posts")` yields every
//! post keyed by ID. Any call may fail with [`SyncError::Offline`].

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A notification that something under a subscribed path changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    /// Path that was written or deleted.
    pub path: String,
    /// New value, `None` for deletions.
    pub value: Option<Value>,
}

/// Callback invoked for remote changes.
pub type RemoteListener = Arc<dyn Fn(&RemoteEvent) + Send + Sync>;

/// Handle returned by [`RemoteStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A path-addressed remote store.
///
/// Writes are idempotent per path: replaying the same write twice leaves the
/// store in the same state as writing it once.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the value at `path`, or the object of its children.
    async fn read_path(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Replaces the value at `path`.
    async fn write_path(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Removes `path` and everything below it. Missing paths are not an error.
    async fn delete_path(&self, path: &str) -> SyncResult<()>;

    /// Registers a listener for changes at or below `path`.
    fn subscribe(&self, path: &str, listener: RemoteListener) -> SyncResult<SubscriptionId>;

    /// Removes a listener. Unknown handles are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

struct Subscription {
    id: SubscriptionId,
    path: String,
    listener: RemoteListener,
}

/// In-process remote store with an offline switch and latency injection.
///
/// Leaf records are stored by full path; parent reads are assembled from
/// the leaves underneath.
pub struct MemoryRemoteStore {
    records: RwLock<BTreeMap<String, Value>>,
    online: AtomicBool,
    latency: Mutex<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
    next_subscription: AtomicU64,
}

impl MemoryRemoteStore {
    /// Creates an empty, online store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            online: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            subscriptions: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Switches connectivity. While offline every call fails with `Offline`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns whether the store currently accepts calls.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Seeds a record without counting a write or notifying listeners.
    pub fn insert(&self, path: impl Into<String>, value: Value) {
        self.records.write().insert(path.into(), value);
    }

    /// Returns the leaf record at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.records.read().get(path).cloned()
    }

    /// Returns every leaf path in order.
    pub fn paths(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Returns the number of leaf records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of successful reads.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful deletes.
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> SyncResult<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::offline("memory remote store is offline"))
        }
    }

    fn notify(&self, path: &str, value: Option<Value>) {
        let listeners: Vec<RemoteListener> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| is_within(path, &s.path))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        if listeners.is_empty() {
            return;
        }
        let event = RemoteEvent {
            path: path.to_string(),
            value,
        };
        for listener in listeners {
            listener(&event);
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if `path` equals `root` or lies below it.
fn is_within(path: &str, root: &str) -> bool {
    root.is_empty()
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn insert_nested(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            node.insert((*leaf).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = node
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_nested(map, rest, value);
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn read_path(&self, path: &str) -> SyncResult<Option<Value>> {
        self.round_trip().await?;
        self.reads.fetch_add(1, Ordering::SeqCst);

        let records = self.records.read();
        if let Some(value) = records.get(path) {
            return Ok(Some(value.clone()));
        }

        let prefix = format!("{path}/");
        let mut children = Map::new();
        for (key, value) in records.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            let segments: Vec<&str> = rest.split('/').collect();
            insert_nested(&mut children, &segments, value.clone());
        }

        if children.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(children)))
        }
    }

    async fn write_path(&self, path: &str, value: Value) -> SyncResult<()> {
        self.round_trip().await?;
        self.records.write().insert(path.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(path, "remote write");
        self.notify(path, Some(value));
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> SyncResult<()> {
        self.round_trip().await?;
        self.records
            .write()
            .retain(|key, _| !is_within(key, path));
        self.deletes.fetch_add(1, Ordering::SeqCst);
        debug!(path, "remote delete");
        self.notify(path, None);
        Ok(())
    }

    fn subscribe(&self, path: &str, listener: RemoteListener) -> SyncResult<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.write().push(Subscription {
            id,
            path: path.to_string(),
            listener,
        });
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.write().retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn parent_read_returns_children() {
        let store = MemoryRemoteStore::new();
        store.write_path("posts/p1", json!({"text": "a"})).await.unwrap();
        store.write_path("posts/p2", json!({"text": "b"})).await.unwrap();
        store.write_path("postscript/x", json!(1)).await.unwrap();

        let value = store.read_path("posts").await.unwrap().unwrap();
        let children = value.as_object().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children["p1"]["text"], "a");

        assert_eq!(
            store.read_path("posts/p1").await.unwrap(),
            Some(json!({"text": "a"}))
        );
        assert_eq!(store.read_path("comments").await.unwrap(), None);
    }

    #[tokio::test]
    async fn nested_children_build_a_tree() {
        let store = MemoryRemoteStore::new();
        store.insert("a/b/c", json!(1));
        store.insert("a/d", json!(2));

        let value = store.read_path("a").await.unwrap().unwrap();
        assert_eq!(value, json!({"b": {"c": 1}, "d": 2}));
    }

    #[tokio::test]
    async fn offline_fails_every_call() {
        let store = MemoryRemoteStore::new();
        store.set_online(false);

        assert!(matches!(store.read_path("posts").await, Err(SyncError::Offline(_))));
        assert!(matches!(
            store.write_path("posts/p1", json!({})).await,
            Err(SyncError::Offline(_))
        ));
        assert!(matches!(store.delete_path("posts/p1").await, Err(SyncError::Offline(_))));
        assert_eq!(store.write_count(), 0);
        assert!(store.is_empty());

        store.set_online(true);
        store.write_path("posts/p1", json!({})).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn writes_are_idempotent() {
        let store = MemoryRemoteStore::new();
        store.write_path("posts/p1", json!({"v": 1})).await.unwrap();
        store.write_path("posts/p1", json!({"v": 1})).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn delete_removes_subtree_only() {
        let store = MemoryRemoteStore::new();
        store.insert("posts/p1", json!(1));
        store.insert("posts/p10", json!(2));

        store.delete_path("posts/p1").await.unwrap();
        store.delete_path("posts/missing").await.unwrap();

        assert_eq!(store.paths(), vec!["posts/p10".to_string()]);
    }

    #[tokio::test]
    async fn listeners_see_changes_below_their_path() {
        let store = MemoryRemoteStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store
            .subscribe(
                "posts",
                Arc::new(move |event: &RemoteEvent| sink.lock().push(event.path.clone())),
            )
            .unwrap();

        store.write_path("posts/p1", json!({})).await.unwrap();
        store.write_path("comments/c1", json!({})).await.unwrap();
        store.delete_path("posts/p1").await.unwrap();
        store.unsubscribe(id);
        store.write_path("posts/p2", json!({})).await.unwrap();

        assert_eq!(*seen.lock(), vec!["posts/p1".to_string(), "posts/p1".to_string()]);
    }

    #[tokio::test]
    async fn latency_delays_calls() {
        let store = MemoryRemoteStore::new();
        store.set_latency(Duration::from_millis(30));

        let started = std::time::Instant::now();
        store.read_path("posts").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
