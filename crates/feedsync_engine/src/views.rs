//! Derived read views.
//!
//! Every entity lives in exactly one canonical record. Views that combine
//! collections (a post with its author, a user's timeline) are joined at
//! read time instead of being written to several places.

use crate::engine::SyncEngine;
use crate::remote::RemoteStore;
use feedsync_model::{Comment, EntityId, Filter, FollowEdge, Post, UserProfile};
use feedsync_storage::LocalStore;
use std::collections::{HashMap, HashSet};

/// A post joined with its author's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    /// The post.
    pub post: Post,
    /// The author's profile, if it is known.
    pub author: Option<UserProfile>,
    /// Number of comments that have not been deleted.
    pub comment_count: usize,
}

/// A post with its comments, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    /// The post.
    pub post: Post,
    /// Its comments.
    pub comments: Vec<Comment>,
}

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    /// Returns the posts selected by `filter`, newest first, with authors.
    pub async fn read_feed(&self, filter: &Filter) -> Vec<FeedItem> {
        let (posts, profiles) = tokio::join!(
            self.read::<Post>(filter),
            self.read::<UserProfile>(&Filter::All)
        );
        let profiles: HashMap<EntityId, UserProfile> = profiles
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        posts
            .into_iter()
            .map(|post| FeedItem {
                author: profiles.get(&post.author_id).cloned(),
                comment_count: post
                    .comment_ids
                    .iter()
                    .filter(|id| !self.is_deleted(id))
                    .count(),
                post,
            })
            .collect()
    }

    /// Returns posts authored by the accounts `user` follows, newest first.
    pub async fn read_timeline(&self, user: &EntityId) -> Vec<Post> {
        let edges: Vec<FollowEdge> = self.read(&Filter::Follower(user.clone())).await;
        if edges.is_empty() {
            return Vec::new();
        }
        let followees: HashSet<EntityId> = edges.into_iter().map(|e| e.followee_id).collect();

        self.read::<Post>(&Filter::All)
            .await
            .into_iter()
            .filter(|p| followees.contains(&p.author_id))
            .collect()
    }

    /// Returns a post and its comments.
    pub async fn read_thread(&self, post_id: &EntityId) -> Option<Thread> {
        let filter = Filter::Post(post_id.clone());
        let (post, comments) = tokio::join!(self.get::<Post>(post_id), self.read::<Comment>(&filter));
        post.map(|post| Thread { post, comments })
    }
}
