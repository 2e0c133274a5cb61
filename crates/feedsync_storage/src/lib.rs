//! # FeedSync Storage
//!
//! Local key-value store trait and implementations for FeedSync.
//!
//! This crate provides the lowest tier of the FeedSync cache: a durable
//! string key → string value store. Stores are **opaque**: they do not
//! interpret the JSON records the sync engine writes into them.
//!
//! ## Design Principles
//!
//! - Stores are simple key-value maps (get, set, remove, keys)
//! - No transactions and no atomicity across multiple keys
//! - Every operation is asynchronous so callers never block a shared thread
//! - Must be `Send + Sync` so one store can back a shared engine
//!
//! ## Available Stores
//!
//! - [`InMemoryLocalStore`] - For testing and ephemeral caches
//! - [`FileLocalStore`] - For persistent storage in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use feedsync_storage::{InMemoryLocalStore, LocalStore};
//!
//! # tokio_test_block(async {
//! let store = InMemoryLocalStore::new();
//! store.set("posts/p1", "{}".to_string()).await.unwrap();
//! assert_eq!(store.get("posts/p1").await.unwrap().as_deref(), Some("{}"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{keys_with_prefix, LocalStore};
pub use error::{StorageError, StorageResult};
pub use file::FileLocalStore;
pub use memory::InMemoryLocalStore;
