//! Local store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;

/// A durable string key → string value store.
///
/// Local stores are **opaque string maps**. The sync engine owns all record
/// interpretation; stores do not understand entities, tombstones, or the
/// pending-write queue.
///
/// # Invariants
///
/// - `get` returns exactly the value most recently `set` for that key
/// - `remove` of a missing key is not an error
/// - `keys` returns every key currently holding a value, in no particular order
/// - Each call is atomic on its own; there is no atomicity across keys
///
/// # Implementors
///
/// - [`super::InMemoryLocalStore`] - For testing
/// - [`super::FileLocalStore`] - For persistent storage
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// After this returns successfully the value is durable for stores that
    /// provide durability.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be persisted.
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists every key currently holding a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be read.
    async fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Lists the keys that start with `prefix`, sorted.
///
/// # Errors
///
/// Propagates any error from [`LocalStore::keys`].
pub async fn keys_with_prefix<S: LocalStore + ?Sized>(
    store: &S,
    prefix: &str,
) -> StorageResult<Vec<String>> {
    let mut keys: Vec<String> = store
        .keys()
        .await?
        .into_iter()
        .filter(|k| k.starts_with(prefix))
        .collect();
    keys.sort();
    Ok(keys)
}
