//! # FeedSync Engine
//!
//! Offline-first sync engine for FeedSync.
//!
//! This crate provides:
//! - `SyncEngine`, the single owner of cache and sync state
//! - The `RemoteStore` abstraction and an in-memory implementation
//! - A durable tombstone registry and a coalescing pending write queue
//! - Replay with exponential backoff, driven by lifecycle events
//! - Change notifications per entity kind
//! - Derived views and social operations over the canonical records
//!
//! ## Architecture
//!
//! Every read merges the local cache with the remote store:
//! 1. Fetch local and remote concurrently; the remote side has a timeout
//! 2. Merge newest-wins, dropping tombstoned IDs
//! 3. Write the merged result back to the local cache
//!
//! Every write commits locally first, then tries the remote store and queues
//! the operation for replay if that fails.
//!
//! ## Key Invariants
//!
//! - Read-your-write: a committed write is visible to the next read
//! - A tombstoned ID never reappears in any read result
//! - Replaying a queued operation twice has the same effect as once
//! - An unreachable remote store degrades reads, it never fails them
//!
//! ## Example
//!
//! ```rust
//! use feedsync_engine::{MemoryRemoteStore, SyncConfig, SyncEngine};
//! use feedsync_model::{Filter, Post};
//! use feedsync_storage::InMemoryLocalStore;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let engine = SyncEngine::open(
//!     SyncConfig::default(),
//!     Arc::new(InMemoryLocalStore::new()),
//!     Arc::new(MemoryRemoteStore::new()),
//! )
//! .await?;
//!
//! engine.write(Post::new("alice", "hello")).await?;
//! let feed: Vec<Post> = engine.read(&Filter::All).await;
//! assert_eq!(feed.len(), 1);
//! # Ok::<(), feedsync_engine::SyncError>(())
//! # }).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod engine;
mod error;
mod pending;
mod remote;
mod scheduler;
mod social;
mod state;
mod tombstones;
mod views;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeListener, ChangeType, ListenerId};
pub use config::{RetryConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use pending::{PendingEntry, PendingOp, PendingWriteQueue, PENDING_KEY};
pub use remote::{MemoryRemoteStore, RemoteEvent, RemoteListener, RemoteStore, SubscriptionId};
pub use scheduler::{LifecycleEvent, ReplayScheduler};
pub use state::{DeleteReport, EntitySyncState, ReplayReport, SyncStats};
pub use tombstones::{TombstoneEntry, TombstoneRegistry, TOMBSTONES_KEY};
pub use views::{FeedItem, Thread};

/// Version of the sync engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
