//! Follow-graph edges.

use super::{check_id, require};
use crate::entity::{Entity, EntityKind, Filter, MergeOrder};
use crate::error::{ModelError, ModelResult};
use crate::ids::{EntityId, Version};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A directed "follows" edge between two users.
///
/// `(follower_id, followee_id)` is the logical key: at most one live edge
/// exists per pair. Every follow still gets a fresh [`EntityId`], so
/// tombstoning one edge on unfollow never blocks a later follow of the same
/// user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdge {
    /// Edge ID, assigned on first write.
    #[serde(default)]
    pub id: EntityId,
    /// The following user.
    pub follower_id: EntityId,
    /// The followed user.
    pub followee_id: EntityId,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Snapshot version.
    #[serde(default)]
    pub version: Version,
}

impl FollowEdge {
    /// Creates an unsaved edge.
    pub fn new(follower_id: impl Into<EntityId>, followee_id: impl Into<EntityId>) -> Self {
        Self {
            id: EntityId::default(),
            follower_id: follower_id.into(),
            followee_id: followee_id.into(),
            created_at: Timestamp::default(),
            version: Version::ZERO,
        }
    }

    /// Returns true if this edge is `follower → followee`.
    #[must_use]
    pub fn connects(&self, follower_id: &EntityId, followee_id: &EntityId) -> bool {
        &self.follower_id == follower_id && &self.followee_id == followee_id
    }
}

impl Entity for FollowEdge {
    const KIND: EntityKind = EntityKind::Follow;
    const DEFAULT_ORDER: MergeOrder = MergeOrder::CreatedDesc;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn assign_id(&mut self) {
        if self.id.is_empty() {
            self.id = EntityId::new();
        }
    }

    fn init_created_at(&mut self, now: Timestamp) {
        if self.created_at == Timestamp::default() {
            self.created_at = now;
        }
    }

    fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    fn validate(&self) -> ModelResult<()> {
        require("follow edge", "follower_id", &self.follower_id)?;
        require("follow edge", "followee_id", &self.followee_id)?;
        if self.follower_id == self.followee_id {
            return Err(ModelError::SelfFollow(self.follower_id.to_string()));
        }
        check_id("follow edge", "id", &self.id)
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::All => true,
            Filter::Id(id) => &self.id == id,
            Filter::Follower(user) => &self.follower_id == user,
            Filter::Followee(user) => &self.followee_id == user,
            _ => false,
        }
    }
}
