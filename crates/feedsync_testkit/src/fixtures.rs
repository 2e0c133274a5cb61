//! Test fixtures and engine helpers.
//!
//! Provides devices (an engine plus the stores and clock behind it) for
//! single-device, multi-device and restart scenarios.

use feedsync_engine::{MemoryRemoteStore, RemoteStore, RetryConfig, SyncConfig, SyncEngine};
use feedsync_model::{
    record_key, Comment, EntityId, EntityKind, ManualClock, Post, Timestamp, UserProfile,
};
use feedsync_storage::{FileLocalStore, InMemoryLocalStore, LocalStore};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Engine over in-memory stores.
pub type MemoryEngine = SyncEngine<InMemoryLocalStore, MemoryRemoteStore>;

/// Engine over a file-backed local store.
pub type FileEngine = SyncEngine<FileLocalStore, MemoryRemoteStore>;

/// Initial time of every fixture clock.
pub const START_TIME: Timestamp = Timestamp(1_700_000_000_000);

/// A configuration with short timeouts and backoff, for tests.
pub fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_remote_timeout(Duration::from_millis(250))
        .with_retry(RetryConfig::new(
            Duration::from_millis(10),
            Duration::from_millis(80),
        ))
}

/// One simulated device: an engine, its stores and its clock.
pub struct TestDevice {
    /// The engine under test.
    pub engine: Arc<MemoryEngine>,
    /// The device's local cache.
    pub local: Arc<InMemoryLocalStore>,
    /// The remote store, possibly shared with other devices.
    pub remote: Arc<MemoryRemoteStore>,
    /// The device clock.
    pub clock: Arc<ManualClock>,
    config: SyncConfig,
}

impl TestDevice {
    /// Creates a device with fresh stores and [`fast_config`].
    pub async fn new() -> Self {
        Self::with_config(fast_config()).await
    }

    /// Creates a device with fresh stores and `config`.
    pub async fn with_config(config: SyncConfig) -> Self {
        Self::open(
            config,
            Arc::new(InMemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(ManualClock::new(START_TIME)),
        )
        .await
    }

    async fn open(
        config: SyncConfig,
        local: Arc<InMemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let engine = SyncEngine::open_with_clock(
            config.clone(),
            Arc::clone(&local),
            Arc::clone(&remote),
            clock.clone(),
        )
        .await
        .expect("Failed to open engine");

        Self {
            engine: Arc::new(engine),
            local,
            remote,
            clock,
            config,
        }
    }

    /// Creates another device with an empty cache sharing this device's
    /// remote store and clock.
    pub async fn second_device(&self) -> Self {
        Self::open(
            self.config.clone(),
            Arc::new(InMemoryLocalStore::new()),
            Arc::clone(&self.remote),
            Arc::clone(&self.clock),
        )
        .await
    }

    /// Simulates a process restart: a new engine over the same stores.
    pub async fn restart(self) -> Self {
        let Self {
            engine,
            local,
            remote,
            clock,
            config,
        } = self;
        drop(engine);
        Self::open(config, local, remote, clock).await
    }

    /// Makes every remote call fail with `Offline`.
    pub fn go_offline(&self) {
        self.remote.set_online(false);
    }

    /// Restores remote connectivity.
    pub fn go_online(&self) {
        self.remote.set_online(true);
    }

    /// Advances the device clock and returns the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        self.clock.advance(by);
        self.now()
    }

    /// Returns the device time.
    pub fn now(&self) -> Timestamp {
        feedsync_model::Clock::now(self.clock.as_ref())
    }

    /// Returns the raw remote record of an entity.
    pub fn remote_record(&self, kind: EntityKind, id: &EntityId) -> Option<Value> {
        self.remote.get(&record_key(kind, id))
    }

    /// Returns the raw cached record of an entity.
    pub async fn cached_record(&self, kind: EntityKind, id: &EntityId) -> Option<String> {
        self.local
            .get(&record_key(kind, id))
            .await
            .expect("Failed to read local store")
    }
}

/// A device whose local cache lives in a temporary directory.
pub struct FileDevice {
    /// The engine under test.
    pub engine: Arc<FileEngine>,
    /// The remote store.
    pub remote: Arc<MemoryRemoteStore>,
    /// The device clock.
    pub clock: Arc<ManualClock>,
    config: SyncConfig,
    dir: TempDir,
}

impl FileDevice {
    /// Creates a device with an empty store directory.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        Self::open(
            fast_config(),
            dir,
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(ManualClock::new(START_TIME)),
        )
        .await
    }

    async fn open(
        config: SyncConfig,
        dir: TempDir,
        remote: Arc<MemoryRemoteStore>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let local = FileLocalStore::open(dir.path(), true).expect("Failed to open file store");
        let engine = SyncEngine::open_with_clock(
            config.clone(),
            Arc::new(local),
            Arc::clone(&remote),
            clock.clone(),
        )
        .await
        .expect("Failed to open engine");

        Self {
            engine: Arc::new(engine),
            remote,
            clock,
            config,
            dir,
        }
    }

    /// Closes the store and reopens it from disk.
    ///
    /// Panics if another handle to the engine is still alive.
    pub async fn restart(self) -> Self {
        let Self {
            engine,
            remote,
            clock,
            config,
            dir,
        } = self;
        assert_eq!(
            Arc::strong_count(&engine),
            1,
            "engine handle still in use, the store lock would be held"
        );
        drop(engine);
        Self::open(config, dir, remote, clock).await
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Makes every remote call fail with `Offline`.
    pub fn go_offline(&self) {
        self.remote.set_online(false);
    }

    /// Restores remote connectivity.
    pub fn go_online(&self) {
        self.remote.set_online(true);
    }
}

/// Returns an unsaved post.
pub fn sample_post(author: &str, text: &str) -> Post {
    Post::new(author, text)
}

/// Returns an unsaved comment.
pub fn sample_comment(post: &EntityId, author: &str, text: &str) -> Comment {
    Comment::new(post.clone(), author, text)
}

/// Returns a profile whose display name is derived from `id`.
pub fn sample_profile(id: &str) -> UserProfile {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    UserProfile::new(id, name)
}

/// Writes one profile per ID and returns them as stored.
pub async fn seed_profiles<L, R>(engine: &SyncEngine<L, R>, ids: &[&str]) -> Vec<UserProfile>
where
    L: LocalStore,
    R: RemoteStore,
{
    let mut profiles = Vec::with_capacity(ids.len());
    for id in ids {
        let profile = engine
            .update_profile(sample_profile(id))
            .await
            .expect("Failed to seed profile");
        profiles.push(profile);
    }
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_model::{Filter, Post};

    #[tokio::test]
    async fn devices_share_the_remote_store() {
        let a = TestDevice::new().await;
        let b = a.second_device().await;

        let id = a.engine.write(sample_post("alice", "hi")).await.unwrap();
        let seen: Vec<Post> = b.engine.read(&Filter::All).await;

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, id);
        assert!(a.remote_record(EntityKind::Post, &id).is_some());
    }

    #[tokio::test]
    async fn restart_keeps_the_cache() {
        let device = TestDevice::new().await;
        let id = device.engine.write(sample_post("alice", "hi")).await.unwrap();

        let device = device.restart().await;
        assert!(device.cached_record(EntityKind::Post, &id).await.is_some());
    }

    #[tokio::test]
    async fn file_device_reopens() {
        let device = FileDevice::new().await;
        device.go_offline();
        device.engine.write(sample_post("alice", "hi")).await.unwrap();

        let device = device.restart().await;
        assert_eq!(device.engine.pending().len(), 1);
        assert!(device.path().join("store.json").exists());
    }

    #[test]
    fn sample_profile_capitalizes_name() {
        assert_eq!(sample_profile("alice").display_name, "Alice");
    }

    #[test]
    fn clock_advances() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let device = rt.block_on(TestDevice::new());
        assert_eq!(device.advance(Duration::from_secs(1)), Timestamp(START_TIME.0 + 1_000));
    }
}
