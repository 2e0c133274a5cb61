//! In-memory local store for testing.

use crate::backend::LocalStore;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory local store.
///
/// This store keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral caches that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    data: RwLock<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryLocalStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with pre-existing entries.
    ///
    /// Useful for simulating a cache left behind by a previous session.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Returns a copy of all entries in the store.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data.read().clone()
    }

    /// Writes a raw value without going through the async interface.
    ///
    /// Tests use this to plant corrupt records.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Makes every `set` and `remove` fail with an I/O error while enabled.
    ///
    /// Tests use this to simulate a full or read-only disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("writes are disabled")));
        }
        Ok(())
    }

    /// Returns the number of keys in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.check_writable()?;
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_writable()?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::keys_with_prefix;

    #[tokio::test]
    async fn memory_new_is_empty() {
        let store = InMemoryLocalStore::new();
        assert!(store.is_empty());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_set_then_get() {
        let store = InMemoryLocalStore::new();
        store.set("posts/a", "one".into()).await.unwrap();
        assert_eq!(store.get("posts/a").await.unwrap().as_deref(), Some("one"));

        store.set("posts/a", "two".into()).await.unwrap();
        assert_eq!(store.get("posts/a").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn memory_remove_missing_is_ok() {
        let store = InMemoryLocalStore::new();
        store.remove("nope").await.unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_failing_writes_change_nothing() {
        let store = InMemoryLocalStore::with_entries([("posts/a", "1")]);
        store.set_fail_writes(true);
        assert!(store.set("posts/b", "2".into()).await.is_err());
        assert!(store.remove("posts/a").await.is_err());
        assert_eq!(store.len(), 1);

        store.set_fail_writes(false);
        store.set("posts/b", "2".into()).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn memory_prefix_listing() {
        let store = InMemoryLocalStore::with_entries([
            ("posts/b", "1"),
            ("posts/a", "2"),
            ("comments/c", "3"),
        ]);
        let keys = keys_with_prefix(&store, "posts/").await.unwrap();
        assert_eq!(keys, vec!["posts/a".to_string(), "posts/b".to_string()]);
    }
}
