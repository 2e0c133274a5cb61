//! The `Entity` trait and collection metadata.

use crate::error::ModelResult;
use crate::ids::{EntityId, Version};
use crate::timestamp::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// The kind of an entity, which also names its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Feed posts.
    Post,
    /// Comments on posts.
    Comment,
    /// User profiles.
    Profile,
    /// Follow-graph edges.
    Follow,
}

impl EntityKind {
    /// Every kind, in a stable order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Post,
        EntityKind::Comment,
        EntityKind::Profile,
        EntityKind::Follow,
    ];

    /// Returns the collection name used as key prefix and remote path.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            EntityKind::Post => "posts",
            EntityKind::Comment => "comments",
            EntityKind::Profile => "profiles",
            EntityKind::Follow => "follows",
        }
    }

    /// Parses a collection name back into a kind.
    #[must_use]
    pub fn from_collection(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == name)
    }

    /// Returns the singular name used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::Profile => "profile",
            EntityKind::Follow => "follow edge",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Ordering applied to a merge result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    /// Newest `created_at` first (feeds).
    CreatedDesc,
    /// Oldest `created_at` first (comment threads).
    CreatedAsc,
    /// Ascending by ID.
    ById,
}

/// Selects a subset of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// Every entity in the collection.
    #[default]
    All,
    /// The entity with this ID.
    Id(EntityId),
    /// Entities authored by this user.
    Author(EntityId),
    /// Comments belonging to this post.
    Post(EntityId),
    /// Follow edges whose follower is this user.
    Follower(EntityId),
    /// Follow edges whose followee is this user.
    Followee(EntityId),
}

/// An immutable, versioned snapshot of one social entity.
///
/// The sync engine is generic over this trait: every tier stores entities as
/// JSON produced by their `Serialize` impl, and the merge resolver compares
/// them only through the accessors below.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind (and collection) of this entity type.
    const KIND: EntityKind;

    /// Order applied to merged reads of this collection.
    const DEFAULT_ORDER: MergeOrder;

    /// Returns the entity ID (empty until assigned).
    fn id(&self) -> &EntityId;

    /// Returns the entity version.
    fn version(&self) -> Version;

    /// Returns the creation time.
    fn created_at(&self) -> Timestamp;

    /// Returns the owning entity, if any.
    ///
    /// Entities whose parent is tombstoned are dropped by merge.
    fn parent_id(&self) -> Option<&EntityId> {
        None
    }

    /// Returns the authoring user, if any.
    fn author_id(&self) -> Option<&EntityId> {
        None
    }

    /// Returns true if this snapshot mirrors a tombstone.
    fn is_deleted(&self) -> bool {
        false
    }

    /// Assigns an ID if none is set.
    fn assign_id(&mut self);

    /// Sets the creation time if none is set.
    fn init_created_at(&mut self, now: Timestamp);

    /// Returns this snapshot carrying `version`.
    #[must_use]
    fn with_version(self, version: Version) -> Self;

    /// Checks field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ModelError`] describing the first violated invariant.
    fn validate(&self) -> ModelResult<()>;

    /// Returns true if this entity is selected by `filter`.
    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::All => true,
            Filter::Id(id) => self.id() == id,
            Filter::Author(author) => self.author_id() == Some(author),
            Filter::Post(post) => self.parent_id() == Some(post),
            Filter::Follower(_) | Filter::Followee(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(kind.collection()), Some(kind));
        }
        assert_eq!(EntityKind::from_collection("likes"), None);
    }

    #[test]
    fn kind_display_is_collection() {
        assert_eq!(EntityKind::Profile.to_string(), "profiles");
        assert_eq!(EntityKind::Follow.name(), "follow edge");
    }
}
