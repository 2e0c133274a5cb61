//! Feed posts.

use super::{apply_delta, check_id, require};
use crate::entity::{Entity, EntityKind, Filter, MergeOrder};
use crate::error::{ModelError, ModelResult};
use crate::ids::{EntityId, Version};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A post in the social feed.
///
/// `comment_ids` keeps insertion order, which is chronological. `deleted`
/// mirrors a tombstone so a soft-deleted post written by another device is
/// excluded from merges even before the local registry learns about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Post ID.
    #[serde(default)]
    pub id: EntityId,
    /// Authoring user.
    pub author_id: EntityId,
    /// Body text.
    #[serde(default)]
    pub text: String,
    /// Opaque reference to an attached image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Number of likes.
    #[serde(default)]
    pub like_count: u64,
    /// Comments on this post, oldest first.
    #[serde(default)]
    pub comment_ids: Vec<EntityId>,
    /// Snapshot version.
    #[serde(default)]
    pub version: Version,
    /// Tombstone mirror.
    #[serde(default)]
    pub deleted: bool,
}

impl Post {
    /// Creates an unsaved text post.
    pub fn new(author_id: impl Into<EntityId>, text: impl Into<String>) -> Self {
        Self {
            id: EntityId::default(),
            author_id: author_id.into(),
            text: text.into(),
            image_ref: None,
            created_at: Timestamp::default(),
            like_count: 0,
            comment_ids: Vec::new(),
            version: Version::ZERO,
            deleted: false,
        }
    }

    /// Sets the ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    /// Attaches an image reference.
    #[must_use]
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Replaces the body text.
    #[must_use]
    pub fn edited(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Adjusts the like count by `delta`, clamping at zero.
    #[must_use]
    pub fn with_like_delta(mut self, delta: i64) -> Self {
        self.like_count = apply_delta(self.like_count, delta);
        self
    }

    /// Appends a comment ID if it is not already listed.
    #[must_use]
    pub fn with_comment(mut self, comment_id: EntityId) -> Self {
        if !self.comment_ids.contains(&comment_id) {
            self.comment_ids.push(comment_id);
        }
        self
    }

    /// Drops a comment ID.
    #[must_use]
    pub fn without_comment(mut self, comment_id: &EntityId) -> Self {
        self.comment_ids.retain(|id| id != comment_id);
        self
    }
}

impl Entity for Post {
    const KIND: EntityKind = EntityKind::Post;
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

    fn author_id(&self) -> Option<&EntityId> {
        Some(&self.author_id)
    }

    fn is_deleted(&self) -> bool {
        self.deleted
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
        check_id("post", "id", &self.id)?;
        require("post", "author_id", &self.author_id)?;
        if self.text.trim().is_empty() && self.image_ref.is_none() {
            return Err(ModelError::invalid("post", "needs text or an image"));
        }
        Ok(())
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::All => true,
            Filter::Id(id) => &self.id == id,
            Filter::Author(author) => &self.author_id == author,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_count_clamps() {
        let post = Post::new("u1", "hi").with_like_delta(1).with_like_delta(-3);
        assert_eq!(post.like_count, 0);
    }

    #[test]
    fn comments_keep_insertion_order() {
        let post = Post::new("u1", "hi")
            .with_comment("c2".into())
            .with_comment("c1".into())
            .with_comment("c2".into());
        assert_eq!(post.comment_ids, vec![EntityId::from("c2"), EntityId::from("c1")]);

        let post = post.without_comment(&EntityId::from("c2"));
        assert_eq!(post.comment_ids, vec![EntityId::from("c1")]);
    }

    #[test]
    fn validation() {
        assert!(Post::new("u1", "hello").validate().is_ok());
        assert!(Post::new("u1", "  ").validate().is_err());
        assert!(Post::new("u1", "").with_image("img://1").validate().is_ok());
        assert!(Post::new("", "hello").validate().is_err());
    }

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let post = Post::new("u1", "hi").with_id("p1");
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["authorId"], "u1");
        assert!(json.get("imageRef").is_none());

        let decoded: Post =
            serde_json::from_str(r#"{"id":"p2","authorId":"u2","text":"x"}"#).unwrap();
        assert_eq!(decoded.like_count, 0);
        assert!(!decoded.deleted);
        assert_eq!(decoded.version, Version::ZERO);
    }

    #[test]
    fn assign_id_only_when_missing() {
        let mut post = Post::new("u1", "hi");
        post.assign_id();
        assert!(!post.id.is_empty());

        let mut post = Post::new("u1", "hi").with_id("fixed");
        post.assign_id();
        assert_eq!(post.id, EntityId::from("fixed"));
    }
}
