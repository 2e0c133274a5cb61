//! Integration tests for posts, comments, likes and follows.

use feedsync_engine::SyncError;
use feedsync_model::{EntityId, EntityKind, Filter, FollowEdge, Post, UserProfile};
use feedsync_testkit::prelude::*;
use std::time::Duration;

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

#[tokio::test]
async fn likes_never_go_negative() {
    let device = TestDevice::new().await;
    let post = device
        .engine
        .create_post(sample_post("alice", "like me"))
        .await
        .unwrap();

    device.engine.like_post(&post.id).await.unwrap();
    let liked = device.engine.like_post(&post.id).await.unwrap();
    assert_eq!(liked.like_count, 2);

    for _ in 0..3 {
        device.engine.unlike_post(&post.id).await.unwrap();
    }
    let stored: Post = device.engine.get(&post.id).await.unwrap();
    assert_eq!(stored.like_count, 0);
    assert!(stored.version > liked.version);
}

#[tokio::test]
async fn liking_an_unknown_post_fails() {
    let device = TestDevice::new().await;
    let err = device.engine.like_post(&id("missing")).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn likes_made_offline_reach_the_remote() {
    let device = TestDevice::new().await;
    let post = device
        .engine
        .create_post(sample_post("alice", "x"))
        .await
        .unwrap();

    device.go_offline();
    device.engine.like_post(&post.id).await.unwrap();
    device.engine.like_post(&post.id).await.unwrap();
    assert_eq!(device.engine.pending().len(), 1);

    device.go_online();
    device.engine.replay_pending().await.unwrap();
    let remote = device.remote_record(EntityKind::Post, &post.id).unwrap();
    assert_eq!(remote["likeCount"], 2);
}

#[tokio::test]
async fn comments_are_linked_and_unlinked() {
    let device = TestDevice::new().await;
    let post = device
        .engine
        .create_post(sample_post("alice", "discuss"))
        .await
        .unwrap();

    let first = device
        .engine
        .add_comment(sample_comment(&post.id, "bob", "first"))
        .await
        .unwrap();
    device.advance(Duration::from_millis(5));
    let second = device
        .engine
        .add_comment(sample_comment(&post.id, "carol", "second"))
        .await
        .unwrap();

    let thread = device.engine.read_thread(&post.id).await.unwrap();
    assert_eq!(thread.post.comment_ids, vec![first.id.clone(), second.id.clone()]);
    let texts: Vec<&str> = thread.comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    device.engine.delete_comment(&first.id).await.unwrap();
    let thread = device.engine.read_thread(&post.id).await.unwrap();
    assert_eq!(thread.post.comment_ids, vec![second.id.clone()]);
    assert_eq!(thread.comments.len(), 1);
}

#[tokio::test]
async fn commenting_on_a_deleted_post_is_rejected() {
    let device = TestDevice::new().await;
    let post = device
        .engine
        .create_post(sample_post("alice", "x"))
        .await
        .unwrap();
    device.engine.delete_post(&post.id).await.unwrap();

    let err = device
        .engine
        .add_comment(sample_comment(&post.id, "bob", "hello?"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn deleting_a_post_deletes_its_comments() {
    let device = TestDevice::new().await;
    let post = device
        .engine
        .create_post(sample_post("alice", "x"))
        .await
        .unwrap();
    let comment = device
        .engine
        .add_comment(sample_comment(&post.id, "bob", "reply"))
        .await
        .unwrap();

    let report = device.engine.delete_post(&post.id).await.unwrap();
    assert!(report.remote_confirmed);
    assert!(device.engine.is_deleted(&post.id));
    assert!(device.engine.is_deleted(&comment.id));
    assert!(device
        .remote_record(EntityKind::Comment, &comment.id)
        .is_none());
    assert!(device.engine.read_thread(&post.id).await.is_none());
}

#[tokio::test]
async fn follow_updates_both_counters_once() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["alice", "bob"]).await;

    let edge = device.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    assert!(!edge.id.is_empty());
    assert!(edge.connects(&id("alice"), &id("bob")));
    let again = device.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    assert_eq!(again.id, edge.id);

    let alice: UserProfile = device.engine.get(&id("alice")).await.unwrap();
    let bob: UserProfile = device.engine.get(&id("bob")).await.unwrap();
    assert_eq!(alice.following_count, 1);
    assert_eq!(bob.follower_count, 1);

    let report = device.engine.unfollow(&id("alice"), &id("bob")).await.unwrap();
    assert!(report.is_some());
    let alice: UserProfile = device.engine.get(&id("alice")).await.unwrap();
    let bob: UserProfile = device.engine.get(&id("bob")).await.unwrap();
    assert_eq!(alice.following_count, 0);
    assert_eq!(bob.follower_count, 0);

    assert!(device
        .engine
        .unfollow(&id("alice"), &id("bob"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn refollowing_after_unfollow_creates_a_new_edge() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["alice", "bob"]).await;
    let first = device.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    device.engine.unfollow(&id("alice"), &id("bob")).await.unwrap();
    assert!(device.engine.is_deleted(&first.id));

    let second = device.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    assert_ne!(second.id, first.id);
    assert!(device.engine.is_deleted(&first.id));
    assert!(!device.engine.is_deleted(&second.id));

    let edges: Vec<FollowEdge> = device
        .engine
        .read(&Filter::Follower(id("alice")))
        .await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, second.id);

    let alice: UserProfile = device.engine.get(&id("alice")).await.unwrap();
    let bob: UserProfile = device.engine.get(&id("bob")).await.unwrap();
    assert_eq!(alice.following_count, 1);
    assert_eq!(bob.follower_count, 1);
}

#[tokio::test]
async fn follows_with_separator_like_ids_do_not_collide() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["a:b", "c", "a", "b:c"]).await;

    let left = device.engine.follow(&id("a:b"), &id("c")).await.unwrap();
    let right = device.engine.follow(&id("a"), &id("b:c")).await.unwrap();
    assert_ne!(left.id, right.id);

    device.engine.unfollow(&id("a:b"), &id("c")).await.unwrap();
    let remaining: Vec<FollowEdge> = device.engine.read(&Filter::All).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, right.id);
}

#[tokio::test]
async fn unfollow_removes_edges_written_by_two_devices() {
    let a = TestDevice::new().await;
    let b = a.second_device().await;
    seed_profiles(&a.engine, &["alice", "bob"]).await;

    // Both devices follow before seeing each other's edge.
    a.go_offline();
    a.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    a.go_online();
    b.engine.follow(&id("alice"), &id("bob")).await.unwrap();
    assert!(a.engine.replay_pending().await.unwrap().is_complete());

    let edges: Vec<FollowEdge> = a.engine.read(&Filter::Follower(id("alice"))).await;
    assert_eq!(edges.len(), 2);

    a.engine.unfollow(&id("alice"), &id("bob")).await.unwrap();
    let edges: Vec<FollowEdge> = b.engine.read(&Filter::Follower(id("alice"))).await;
    assert!(edges.is_empty());
}

#[tokio::test]
async fn self_follow_is_rejected() {
    let device = TestDevice::new().await;
    let err = device
        .engine
        .follow(&id("alice"), &id("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn profile_edits_keep_stored_counters() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["alice", "bob"]).await;
    device.engine.follow(&id("bob"), &id("alice")).await.unwrap();

    let edited = device
        .engine
        .update_profile(UserProfile::new("alice", "Alice A.").with_bio("hi"))
        .await
        .unwrap();
    assert_eq!(edited.follower_count, 1);
    assert_eq!(edited.display_name, "Alice A.");
    assert_eq!(edited.bio, "hi");
}

#[tokio::test]
async fn feed_joins_authors_and_counts_comments() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["alice"]).await;

    let post = device
        .engine
        .create_post(sample_post("alice", "with author"))
        .await
        .unwrap();
    device.advance(Duration::from_millis(1));
    device
        .engine
        .create_post(sample_post("ghost", "no profile"))
        .await
        .unwrap();
    device
        .engine
        .add_comment(sample_comment(&post.id, "bob", "one"))
        .await
        .unwrap();

    let feed = device.engine.read_feed(&Filter::All).await;
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].post.text, "no profile");
    assert!(feed[0].author.is_none());
    assert_eq!(feed[1].post.id, post.id);
    assert_eq!(
        feed[1].author.as_ref().map(|a| a.display_name.as_str()),
        Some("Alice")
    );
    assert_eq!(feed[1].comment_count, 1);
}

#[tokio::test]
async fn timeline_shows_only_followed_authors() {
    let device = TestDevice::new().await;
    seed_profiles(&device.engine, &["alice", "bob", "carol"]).await;
    device.engine.follow(&id("alice"), &id("bob")).await.unwrap();

    device
        .engine
        .create_post(sample_post("bob", "from bob"))
        .await
        .unwrap();
    device
        .engine
        .create_post(sample_post("carol", "from carol"))
        .await
        .unwrap();

    let timeline = device.engine.read_timeline(&id("alice")).await;
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].text, "from bob");

    assert!(device.engine.read_timeline(&id("carol")).await.is_empty());
}

#[tokio::test]
async fn second_device_sees_social_activity() {
    let a = TestDevice::new().await;
    let b = a.second_device().await;

    let post = a
        .engine
        .create_post(sample_post("alice", "shared"))
        .await
        .unwrap();
    b.engine.like_post(&post.id).await.unwrap();
    b.engine
        .add_comment(sample_comment(&post.id, "bob", "from b"))
        .await
        .unwrap();

    let thread = a.engine.read_thread(&post.id).await.unwrap();
    assert_eq!(thread.post.like_count, 1);
    assert_eq!(thread.comments.len(), 1);
}
