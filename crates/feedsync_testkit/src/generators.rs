//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entities and operation sequences
//! that respect the model's invariants.

use feedsync_model::{Comment, Entity, EntityId, FollowEdge, Post, Timestamp, UserProfile, Version};
use proptest::prelude::*;

/// Strategy for user IDs drawn from a small pool, so edges and authors collide.
pub fn user_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::sample::select(vec!["alice", "bob", "carol", "dave"]).prop_map(EntityId::from)
}

/// Strategy for non-empty post and comment text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{1,24}")
        .expect("Invalid regex")
        .prop_filter("Text must not be blank", |s| !s.trim().is_empty())
}

/// Strategy for saved posts with IDs from a pool of `id_pool` values.
pub fn post_strategy(id_pool: u8) -> impl Strategy<Value = Post> {
    (
        0..id_pool.max(1),
        user_id_strategy(),
        text_strategy(),
        0u64..1_000,
        0u64..1_000,
        0u64..50,
    )
        .prop_map(|(id, author, text, created, version, likes)| {
            Post::new(author, text)
                .with_id(format!("p{id}"))
                .with_created_at(Timestamp(created))
                .with_like_delta(i64::try_from(likes).unwrap_or(0))
                .with_version(Version(version))
        })
}

/// Strategy for saved comments on posts `p0..p{post_pool}`.
pub fn comment_strategy(post_pool: u8) -> impl Strategy<Value = Comment> {
    (
        0..post_pool.max(1),
        any::<u16>(),
        user_id_strategy(),
        text_strategy(),
        0u64..1_000,
    )
        .prop_map(|(post, id, author, text, created)| {
            Comment::new(format!("p{post}"), author, text)
                .with_id(format!("c{id}"))
                .with_created_at(Timestamp(created))
        })
}

/// Strategy for profiles of pool users.
pub fn profile_strategy() -> impl Strategy<Value = UserProfile> {
    (user_id_strategy(), text_strategy()).prop_map(|(id, name)| UserProfile::new(id, name))
}

/// Strategy for follow edges between distinct pool users.
pub fn follow_edge_strategy() -> impl Strategy<Value = FollowEdge> {
    (user_id_strategy(), user_id_strategy())
        .prop_filter("No self-follows", |(a, b)| a != b)
        .prop_map(|(a, b)| FollowEdge::new(a, b))
}

/// One step of a randomized engine session.
#[derive(Debug, Clone)]
pub enum EngineOp {
    /// Write (or overwrite) post `p{slot}`.
    Write {
        /// Post slot.
        slot: u8,
        /// New text.
        text: String,
    },
    /// Delete post `p{slot}`.
    Delete {
        /// Post slot.
        slot: u8,
    },
    /// Cut remote connectivity.
    GoOffline,
    /// Restore remote connectivity.
    GoOnline,
    /// Run a replay cycle.
    Replay,
    /// Advance the clock by this many milliseconds.
    Tick(u64),
}

/// Strategy for a single engine step over `slots` post slots.
pub fn engine_op_strategy(slots: u8) -> impl Strategy<Value = EngineOp> {
    let slots = slots.max(1);
    prop_oneof![
        4 => (0..slots, text_strategy()).prop_map(|(slot, text)| EngineOp::Write { slot, text }),
        1 => (0..slots).prop_map(|slot| EngineOp::Delete { slot }),
        1 => Just(EngineOp::GoOffline),
        1 => Just(EngineOp::GoOnline),
        1 => Just(EngineOp::Replay),
        1 => (0u64..5).prop_map(EngineOp::Tick),
    ]
}

/// Strategy for a session of up to `max_len` steps.
pub fn engine_session_strategy(slots: u8, max_len: usize) -> impl Strategy<Value = Vec<EngineOp>> {
    prop::collection::vec(engine_op_strategy(slots), 1..max_len.max(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_posts_are_valid(post in post_strategy(8)) {
            prop_assert!(post.validate().is_ok());
        }

        #[test]
        fn generated_edges_are_valid(edge in follow_edge_strategy()) {
            prop_assert!(edge.validate().is_ok());
        }

        #[test]
        fn generated_comments_reference_pool_posts(comment in comment_strategy(3)) {
            prop_assert!(["p0", "p1", "p2"].contains(&comment.post_id.as_str()));
        }
    }
}
