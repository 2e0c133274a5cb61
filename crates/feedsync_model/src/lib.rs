//! # FeedSync Model
//!
//! Entity types, versioning and merge resolution for FeedSync.
//!
//! This crate provides:
//! - `EntityId`, `Version` and `Timestamp` shared by every tier
//! - The social entities (`Post`, `Comment`, `UserProfile`, `FollowEdge`)
//! - The `Entity` trait the sync engine is generic over
//! - The JSON record codec used for the local cache and the remote store
//! - `merge`, the pure newest-wins, tombstone-filtered merge resolver
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - An ID present in the tombstone set never appears in a merge result
//! - Merge keeps the highest `version` per ID; ties prefer the remote copy
//! - Counters (`like_count`, `follower_count`, `following_count`) never go negative

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod entities;
mod entity;
mod error;
mod ids;
mod merge;
mod timestamp;

pub use codec::{
    decode_collection, decode_record, decode_value, encode_record, record_key, record_prefix,
    remote_path,
};
pub use entities::{Comment, FollowEdge, Post, UserProfile};
pub use entity::{Entity, EntityKind, Filter, MergeOrder};
pub use error::{ModelError, ModelResult};
pub use ids::{EntityId, Version};
pub use merge::{merge, merge_all, merge_ordered, sort_entities};
pub use timestamp::{Clock, ManualClock, SystemClock, Timestamp};
