//! Social operations built on top of `write` and `delete`.
//!
//! Each operation reads the current merged snapshot, derives the next one
//! and writes it back as a whole record. Counters are clamped at zero.

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::state::DeleteReport;
use feedsync_model::{Comment, EntityId, EntityKind, Filter, FollowEdge, Post, UserProfile};
use feedsync_storage::LocalStore;
use tracing::debug;

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    /// Publishes a new post.
    pub async fn create_post(&self, post: Post) -> SyncResult<Post> {
        self.commit_entity(post).await
    }

    /// Adds one like to a post.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the post is unknown.
    pub async fn like_post(&self, post_id: &EntityId) -> SyncResult<Post> {
        self.adjust_likes(post_id, 1).await
    }

    /// Removes one like from a post, never going below zero.
    pub async fn unlike_post(&self, post_id: &EntityId) -> SyncResult<Post> {
        self.adjust_likes(post_id, -1).await
    }

    async fn adjust_likes(&self, post_id: &EntityId, delta: i64) -> SyncResult<Post> {
        let post = self
            .get::<Post>(post_id)
            .await
            .ok_or_else(|| SyncError::NotFound(post_id.clone()))?;
        self.commit_entity(post.with_like_delta(delta)).await
    }

    /// Deletes a post together with its comments.
    pub async fn delete_post(&self, post_id: &EntityId) -> SyncResult<DeleteReport> {
        let comments: Vec<Comment> = self.read(&Filter::Post(post_id.clone())).await;
        let report = self.delete(EntityKind::Post, post_id).await?;
        for comment in comments {
            self.delete(EntityKind::Comment, &comment.id).await?;
        }
        Ok(report)
    }

    /// Writes a comment and links it from its post.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the post has been deleted.
    pub async fn add_comment(&self, comment: Comment) -> SyncResult<Comment> {
        let post = self.get::<Post>(&comment.post_id).await;
        let comment = self.commit_entity(comment).await?;
        match post {
            Some(post) => {
                self.commit_entity(post.with_comment(comment.id.clone()))
                    .await?;
            }
            None => debug!(post = %comment.post_id, "comment written for a post not yet cached"),
        }
        Ok(comment)
    }

    /// Deletes a comment and unlinks it from its post.
    pub async fn delete_comment(&self, comment_id: &EntityId) -> SyncResult<DeleteReport> {
        let comment = self.get::<Comment>(comment_id).await;
        let report = self.delete(EntityKind::Comment, comment_id).await?;
        if let Some(comment) = comment {
            if let Some(post) = self.get::<Post>(&comment.post_id).await {
                self.commit_entity(post.without_comment(comment_id)).await?;
            }
        }
        Ok(report)
    }

    /// Makes `follower` follow `followee` and updates both profiles' counters.
    ///
    /// Following twice is a no-op that returns the existing edge. Each new
    /// follow is a new edge, so following again after an unfollow works.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for self-follows.
    pub async fn follow(&self, follower: &EntityId, followee: &EntityId) -> SyncResult<FollowEdge> {
        if let Some(edge) = self.follow_edges(follower, followee).await.into_iter().next() {
            return Ok(edge);
        }

        let edge = self
            .commit_entity(FollowEdge::new(follower.clone(), followee.clone()))
            .await?;
        self.adjust_profile(follower, |p| p.with_following_delta(1))
            .await?;
        self.adjust_profile(followee, |p| p.with_follower_delta(1))
            .await?;
        Ok(edge)
    }

    /// Removes the edge `follower → followee`.
    ///
    /// Edges written concurrently by other devices for the same pair are
    /// removed too; the counters drop by one. Returns `None` if no edge
    /// existed.
    pub async fn unfollow(
        &self,
        follower: &EntityId,
        followee: &EntityId,
    ) -> SyncResult<Option<DeleteReport>> {
        let edges = self.follow_edges(follower, followee).await;
        let Some((first, rest)) = edges.split_first() else {
            return Ok(None);
        };

        let report = self.delete(EntityKind::Follow, &first.id).await?;
        for duplicate in rest {
            debug!(edge = %duplicate.id, "removing duplicate follow edge");
            self.delete(EntityKind::Follow, &duplicate.id).await?;
        }
        self.adjust_profile(follower, |p| p.with_following_delta(-1))
            .await?;
        self.adjust_profile(followee, |p| p.with_follower_delta(-1))
            .await?;
        Ok(Some(report))
    }

    /// Returns the live edges `follower → followee`, oldest first.
    async fn follow_edges(&self, follower: &EntityId, followee: &EntityId) -> Vec<FollowEdge> {
        let mut edges: Vec<FollowEdge> = self
            .read::<FollowEdge>(&Filter::Follower(follower.clone()))
            .await
            .into_iter()
            .filter(|e| e.connects(follower, followee))
            .collect();
        edges.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        edges
    }

    /// Writes a profile edit.
    ///
    /// Follower and following counters are owned by [`follow`](Self::follow)
    /// and [`unfollow`](Self::unfollow); the stored values win over the ones
    /// carried by `profile`.
    pub async fn update_profile(&self, mut profile: UserProfile) -> SyncResult<UserProfile> {
        if let Some(current) = self.get::<UserProfile>(&profile.id).await {
            profile.follower_count = current.follower_count;
            profile.following_count = current.following_count;
        }
        self.commit_entity(profile).await
    }

    async fn adjust_profile(
        &self,
        user: &EntityId,
        f: impl FnOnce(UserProfile) -> UserProfile,
    ) -> SyncResult<Option<UserProfile>> {
        match self.get::<UserProfile>(user).await {
            Some(profile) => Ok(Some(self.commit_entity(f(profile)).await?)),
            None => {
                debug!(%user, "no profile to update");
                Ok(None)
            }
        }
    }
}
