//! User profiles.

use super::{apply_delta, check_id};
use crate::entity::{Entity, EntityKind, MergeOrder};
use crate::error::{ModelError, ModelResult};
use crate::ids::{EntityId, Version};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A user's public profile.
///
/// The profile is the single canonical record for display name, avatar and
/// follow counters; every screen derives its view from it on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User ID.
    #[serde(default)]
    pub id: EntityId,
    /// Display name.
    pub display_name: String,
    /// Opaque reference to the avatar image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Free-form biography.
    #[serde(default)]
    pub bio: String,
    /// Number of followers.
    #[serde(default)]
    pub follower_count: u64,
    /// Number of accounts followed.
    #[serde(default)]
    pub following_count: u64,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Snapshot version.
    #[serde(default)]
    pub version: Version,
}

impl UserProfile {
    /// Creates an unsaved profile for user `id`.
    pub fn new(id: impl Into<EntityId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            bio: String::new(),
            follower_count: 0,
            following_count: 0,
            created_at: Timestamp::default(),
            version: Version::ZERO,
        }
    }

    /// Replaces the avatar reference.
    #[must_use]
    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// Replaces the biography.
    #[must_use]
    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    /// Replaces the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Adjusts the follower count by `delta`, clamping at zero.
    #[must_use]
    pub fn with_follower_delta(mut self, delta: i64) -> Self {
        self.follower_count = apply_delta(self.follower_count, delta);
        self
    }

    /// Adjusts the following count by `delta`, clamping at zero.
    #[must_use]
    pub fn with_following_delta(mut self, delta: i64) -> Self {
        self.following_count = apply_delta(self.following_count, delta);
        self
    }
}

impl Entity for UserProfile {
    const KIND: EntityKind = EntityKind::Profile;
    const DEFAULT_ORDER: MergeOrder = MergeOrder::ById;

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
        check_id("profile", "id", &self.id)?;
        if self.display_name.trim().is_empty() {
            return Err(ModelError::invalid("profile", "display name is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Filter;

    #[test]
    fn counters_clamp() {
        let profile = UserProfile::new("u1", "Ada")
            .with_follower_delta(-1)
            .with_following_delta(2)
            .with_following_delta(-1);
        assert_eq!(profile.follower_count, 0);
        assert_eq!(profile.following_count, 1);
    }

    #[test]
    fn filter_by_id_only() {
        let profile = UserProfile::new("u1", "Ada");
        assert!(profile.matches(&Filter::Id("u1".into())));
        assert!(!profile.matches(&Filter::Author("u1".into())));
    }

    #[test]
    fn empty_display_name_is_invalid() {
        assert!(UserProfile::new("u1", "").validate().is_err());
    }
}
