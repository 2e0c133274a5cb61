//! # FeedSync Testkit
//!
//! Test utilities for FeedSync.
//!
//! This crate provides:
//! - Engine fixtures over in-memory and file-backed local stores
//! - A manual clock so versions and tombstone ages are deterministic
//! - Multi-device harnesses sharing one remote store
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use feedsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn offline_write_replays() {
//!     let device = TestDevice::new().await;
//!     device.go_offline();
//!     device.engine.write(sample_post("alice", "hi")).await.unwrap();
//!     device.go_online();
//!     assert!(device.engine.replay_pending().await.unwrap().is_complete());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
