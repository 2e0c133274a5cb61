//! Comments on posts.

use super::{check_id, require};
use crate::entity::{Entity, EntityKind, Filter, MergeOrder};
use crate::error::{ModelError, ModelResult};
use crate::ids::{EntityId, Version};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A comment attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment ID.
    #[serde(default)]
    pub id: EntityId,
    /// Owning post.
    pub post_id: EntityId,
    /// Authoring user.
    pub author_id: EntityId,
    /// Body text.
    #[serde(default)]
    pub text: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Snapshot version.
    #[serde(default)]
    pub version: Version,
}

impl Comment {
    /// Creates an unsaved comment.
    pub fn new(
        post_id: impl Into<EntityId>,
        author_id: impl Into<EntityId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::default(),
            post_id: post_id.into(),
            author_id: author_id.into(),
            text: text.into(),
            created_at: Timestamp::default(),
            version: Version::ZERO,
        }
    }

    /// Sets the ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }
}

impl Entity for Comment {
    const KIND: EntityKind = EntityKind::Comment;
    const DEFAULT_ORDER: MergeOrder = MergeOrder::CreatedAsc;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn parent_id(&self) -> Option<&EntityId> {
        Some(&self.post_id)
    }

    fn author_id(&self) -> Option<&EntityId> {
        Some(&self.author_id)
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
        check_id("comment", "id", &self.id)?;
        require("comment", "post_id", &self.post_id)?;
        require("comment", "author_id", &self.author_id)?;
        if self.text.trim().is_empty() {
            return Err(ModelError::invalid("comment", "text is empty"));
        }
        Ok(())
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::All => true,
            Filter::Id(id) => &self.id == id,
            Filter::Author(author) => &self.author_id == author,
            Filter::Post(post) => &self.post_id == post,
            _ => false,
        }
    }
}
